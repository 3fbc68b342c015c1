//! Checkpoint boundary (§6 "Checkpoint contract", SPEC_FULL.md §10.5).
//!
//! `orc-core` depends only on this trait; `orc-db` ships a Postgres-backed
//! implementation. The in-memory implementation here is the default for
//! tests and for running the CLI without a database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint store unavailable: {0}")]
    Unavailable(String),
}

/// Opaque per-thread snapshot storage (§6). The driver is responsible for
/// encoding/decoding `AgentState` to/from bytes; this trait only stores and
/// retrieves them atomically per key.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn get(&self, thread_id: &str) -> Result<Option<Vec<u8>>, CheckpointError>;
    async fn put(&self, thread_id: &str, snapshot: Vec<u8>) -> Result<(), CheckpointError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn Checkpointer) {}
};

/// `tokio::sync::Mutex`-guarded in-process checkpoint store.
#[derive(Default)]
pub struct InMemoryCheckpointer {
    snapshots: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn get(&self, thread_id: &str) -> Result<Option<Vec<u8>>, CheckpointError> {
        Ok(self.snapshots.lock().await.get(thread_id).cloned())
    }

    async fn put(&self, thread_id: &str, snapshot: Vec<u8>) -> Result<(), CheckpointError> {
        self.snapshots
            .lock()
            .await
            .insert(thread_id.to_string(), snapshot);
        Ok(())
    }
}
