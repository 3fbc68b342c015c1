//! Conversation-to-plan agent orchestration core.
//!
//! The module layout mirrors the component table in the design notes:
//! registry → task extraction/classification/orchestration → capability
//! execution → router → driver, with the Gateway as the sole entry point
//! and the checkpoint/LLM boundaries as swappable traits.

pub mod capability;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod execution;
pub mod gateway;
pub mod interrupt;
pub mod llm;
pub mod nodes;
pub mod plan;
pub mod registry;
pub mod router;
pub mod state;

pub use capability::Capability;
pub use checkpoint::Checkpointer;
pub use config::OrchestratorConfig;
pub use driver::{Driver, DriverLimits};
pub use gateway::{Gateway, GatewayOutcome, GatewayResult};
pub use llm::LlmService;
pub use registry::{InfrastructureNode, Registry, RegistryConfig};
pub use state::AgentState;
