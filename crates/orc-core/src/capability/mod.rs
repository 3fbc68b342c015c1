//! Capability descriptor and trait contract (§3 "Capability descriptor",
//! §6 "Capability contract").
//!
//! A capability is a named, pluggable unit invoked by name by the router.
//! Polymorphism across capabilities is by tagged dispatch on `name`, not by
//! subclass method resolution (§9) — every capability implements the same
//! object-safe [`Capability`] trait and is stored behind `Arc<dyn Capability>`
//! in the [`crate::registry::Registry`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::context::ContextType;
use crate::error::ErrorClassification;
use crate::plan::Step;
use crate::state::{AgentState, StateDelta};

/// One worked example used to teach the classifier LLM call (§3
/// `ClassifierGuide`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierExample {
    pub query: String,
    pub expected_match: bool,
    pub reason: String,
}

/// Instructions + few-shot examples presented to the LLM during
/// classification (§4.6 step 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierGuide {
    pub instructions: String,
    pub examples: Vec<ClassifierExample>,
}

/// Instructions + worked `Step` examples presented to the LLM during plan
/// generation (§4.7 step 1), plus the capability's presentation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorGuide {
    pub instructions: String,
    pub examples: Vec<Step>,
    pub order: i32,
}

/// Bounded retry policy (§3). `max_attempts` bounds testable property P3.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_seconds: f64,
    pub backoff_factor: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_seconds: f64, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay_seconds,
            backoff_factor,
        }
    }

    /// Delay before the `attempt`-th retry (0-indexed), per the router's
    /// `base_delay * backoff^retry_count` formula (§4.4 step 2d).
    pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
        let secs = self.base_delay_seconds * self.backoff_factor.powi(attempt as i32);
        std::time::Duration::from_secs_f64(secs.max(0.0))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_seconds: 1.0,
            backoff_factor: 1.5,
        }
    }
}

/// Best-effort streaming sink a capability may call at any point during
/// `execute` (§4.8 "Streaming contract"). Dropping a status message is never
/// an error.
#[derive(Clone)]
pub struct StatusSink {
    sender: mpsc::UnboundedSender<String>,
}

impl StatusSink {
    pub fn new(sender: mpsc::UnboundedSender<String>) -> Self {
        Self { sender }
    }

    /// Send a status update. Best-effort: a closed receiver is silently
    /// ignored.
    pub fn status(&self, text: impl Into<String>) {
        let _ = self.sender.send(text.into());
    }
}

/// The interface a capability must expose (§6 "Capability contract").
///
/// Infrastructure nodes (task extraction, classification, orchestration,
/// router, error — §2) are NOT capabilities: they are declared in the
/// registry but never appear as a plan step, and are dispatched directly by
/// the driver rather than through the execution wrapper.
#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn provides(&self) -> &[ContextType];
    fn requires(&self) -> &[ContextType];

    /// Default `false` per §6.
    fn always_active(&self) -> bool {
        false
    }

    fn classifier_guide(&self) -> &ClassifierGuide;
    fn orchestrator_guide(&self) -> &OrchestratorGuide;

    /// Defaults allowed per §6.
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }

    /// Whether the approval machinery should interrupt before this
    /// capability executes under `ApprovalMode::Selective` (§4.9).
    fn requires_approval(&self) -> bool {
        false
    }

    /// Translate a raised `anyhow::Error` into a severity (§4.8 step 4).
    /// Default per §6: everything CRITICAL.
    fn classify_error(&self, _error: &anyhow::Error) -> ErrorClassification {
        ErrorClassification::critical("an unexpected error occurred")
    }

    /// Execute the capability for the current step. Must return a state
    /// delta including a `store` into the context store under the step's
    /// `context_key`, or raise (§4.8 step 2).
    async fn execute(
        &self,
        state: &AgentState,
        status: &StatusSink,
    ) -> anyhow::Result<StateDelta>;
}

// Compile-time object-safety check, mirroring the source's harness trait.
const _: () = {
    fn _assert_object_safe(_: &dyn Capability) {}
};
