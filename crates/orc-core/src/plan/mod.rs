//! Execution plan data model (§3 "Plan", "Step") and the validation/
//! persistence logic that operates on it.

mod persist;
mod validate;

pub use persist::{PlanMetadata, PlanPersistError, from_json, to_json};
pub use validate::{RequiresLookup, repair_and_validate, validate as validate_plan};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One `{ContextType: context_key}` entry in a step's `inputs` list (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRef {
    pub context_type: String,
    pub context_key: String,
}

/// One plan entry (§3 "Step").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub context_key: String,
    pub capability: String,
    pub task_objective: String,
    pub success_criteria: String,
    pub expected_output: Option<String>,
    pub parameters: Option<serde_json::Value>,
    pub inputs: Vec<InputRef>,
}

/// Capability names that are always permitted as a plan's terminal step
/// (§3, §4.7 step 3).
pub const TERMINAL_CAPABILITIES: [&str; 2] = ["respond", "clarify"];

/// The ordered, dependency-consistent execution plan produced once per task
/// attempt by the orchestrator (§3 "Plan").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub original_task: String,
    pub created_at: DateTime<Utc>,
    pub version: String,
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn new(original_task: impl Into<String>, created_at: DateTime<Utc>, steps: Vec<Step>) -> Self {
        Self {
            original_task: original_task.into(),
            created_at,
            version: "1.0".to_string(),
            steps,
        }
    }

    /// Convenience accessor mirroring the router's step dispatch (§4.4
    /// step 7).
    pub fn step_at(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }
}
