//! Wires a [`Registry`]/[`Driver`] pair usable by both `orc demo` and
//! `orc serve`: one always-active `respond` capability plus the four
//! required infrastructure nodes, sharing whatever [`LlmService`] the
//! caller supplies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use orc_core::capability::{Capability, ClassifierGuide, OrchestratorGuide, RetryPolicy, StatusSink};
use orc_core::driver::{Driver, DriverLimits};
use orc_core::llm::LlmService;
use orc_core::nodes::{ClassificationNode, ErrorNode, OrchestratorNode, TaskExtractionNode};
use orc_core::registry::{Registry, RegistryConfig};
use orc_core::router::RouterLimits;
use orc_core::state::{AgentState, Message, StateDelta};

struct RespondCapability;

#[async_trait]
impl Capability for RespondCapability {
    fn name(&self) -> &str {
        "respond"
    }

    fn description(&self) -> &str {
        "reply to the user in plain text"
    }

    fn provides(&self) -> &[String] {
        &[]
    }

    fn requires(&self) -> &[String] {
        &[]
    }

    fn always_active(&self) -> bool {
        true
    }

    fn classifier_guide(&self) -> &ClassifierGuide {
        unreachable!("always-active, never classified")
    }

    fn orchestrator_guide(&self) -> &OrchestratorGuide {
        static GUIDE: std::sync::OnceLock<OrchestratorGuide> = std::sync::OnceLock::new();
        GUIDE.get_or_init(|| OrchestratorGuide {
            instructions: "reply to the user with a short plain-text message".to_string(),
            examples: Vec::new(),
            order: 0,
        })
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }

    async fn execute(&self, state: &AgentState, _status: &StatusSink) -> anyhow::Result<StateDelta> {
        let task = state.task.current_task.as_deref().unwrap_or("your request");
        Ok(StateDelta::new().with_message(Message::assistant(format!("demo response to: {task}"))))
    }
}

/// Build a driver with a single `respond` capability, using `llm` for the
/// three pipeline LLM call sites.
pub fn build_driver(llm: Arc<dyn LlmService>) -> Driver {
    let capabilities: Vec<Arc<dyn Capability>> = vec![Arc::new(RespondCapability)];

    let mut registry = Registry::new();
    registry
        .register(RegistryConfig {
            capabilities: capabilities.clone(),
            infrastructure_nodes: vec![
                Arc::new(TaskExtractionNode::new(llm.clone())),
                Arc::new(ClassificationNode::new(capabilities.clone(), llm.clone())),
                Arc::new(OrchestratorNode::new(capabilities.clone(), llm.clone())),
                Arc::new(ErrorNode::new(llm.clone())),
            ],
            ..Default::default()
        })
        .expect("respond/task_extraction/classifier/orchestrator/error names never collide");
    registry.initialize().expect("required infrastructure nodes are all registered above");

    Driver::new(
        Arc::new(registry),
        DriverLimits {
            router: RouterLimits {
                max_planning_attempts: 2,
                max_reclassifications: 1,
            },
            graph_recursion_limit: 100,
            max_execution_time: Duration::from_secs(300),
        },
    )
}
