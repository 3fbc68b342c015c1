//! PostgreSQL-backed persistence: connection pooling, migrations, and the
//! [`Checkpointer`](orc_core::checkpoint::Checkpointer) implementation used
//! outside of tests and the in-memory CLI demo.

pub mod checkpoint;
pub mod config;
pub mod pool;

pub use checkpoint::PgCheckpointer;
pub use config::DbConfig;
