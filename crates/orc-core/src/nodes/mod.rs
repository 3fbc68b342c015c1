//! Infrastructure nodes (§2, §4.5–§4.7, §4.10): units that serve the
//! orchestration pipeline itself rather than the user's task. Declared in
//! the registry under [`crate::registry::REQUIRED_INFRASTRUCTURE_NODES`],
//! dispatched directly by the driver, never addressed as a plan step.

mod classification;
mod error_node;
mod orchestrator;
mod task_extraction;

pub use classification::ClassificationNode;
pub use error_node::ErrorNode;
pub use orchestrator::OrchestratorNode;
pub use task_extraction::TaskExtractionNode;
