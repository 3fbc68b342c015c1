//! Classification node (§4.6): resolves `planning.active_capabilities` from
//! `task.current_task` by asking each non-always-active capability's
//! classifier, guided by its `ClassifierGuide`.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::capability::Capability;
use crate::llm::LlmService;
use crate::registry::InfrastructureNode;
use crate::state::{AgentState, StateDelta};

const SYSTEM_PROMPT: &str =
    "Decide whether this capability is relevant to the user's current task.";

/// Rebuilds the active-capability set from scratch on every invocation
/// (§4.6 step 3): always-active capabilities plus every capability whose
/// classifier matched. Re-run on reclassification (§4.4 step 2f); the
/// router, not this node, tracks `reclassification_count`.
///
/// Takes the capability list directly rather than an `Arc<Registry>` — the
/// registry itself is built from the same nodes this one is, so depending
/// on it back would be circular.
pub struct ClassificationNode {
    capabilities: Vec<Arc<dyn Capability>>,
    llm: Arc<dyn LlmService>,
}

impl ClassificationNode {
    pub fn new(capabilities: Vec<Arc<dyn Capability>>, llm: Arc<dyn LlmService>) -> Self {
        Self { capabilities, llm }
    }
}

#[async_trait]
impl InfrastructureNode for ClassificationNode {
    fn name(&self) -> &str {
        "classifier"
    }

    async fn run(&self, state: &AgentState) -> anyhow::Result<StateDelta> {
        let task = state.task.current_task.clone().unwrap_or_default();
        let mut active: HashSet<String> = self
            .capabilities
            .iter()
            .filter(|c| c.always_active())
            .map(|c| c.name().to_string())
            .collect();

        let schema = json!({
            "type": "object",
            "properties": {"matches": {"type": "boolean"}},
        });

        for capability in &self.capabilities {
            if capability.always_active() {
                continue;
            }
            let guide = capability.classifier_guide();
            let prompt = format!(
                "{instructions}\n\nExamples: {examples:?}\n\nTask: {task}",
                instructions = guide.instructions,
                examples = guide.examples,
            );
            let result = self
                .llm
                .complete_structured(SYSTEM_PROMPT, &prompt, &schema)
                .await?;
            if result.get("matches").and_then(|v| v.as_bool()).unwrap_or(false) {
                active.insert(capability.name().to_string());
            }
        }

        Ok(StateDelta {
            active_capabilities: Some(Some(active)),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{ClassifierGuide, OrchestratorGuide, RetryPolicy, StatusSink};
    use crate::error::ErrorClassification;
    use crate::llm::NoopLlmService;
    use crate::state::StateDelta as Delta;

    struct AlwaysActiveCapability;

    #[async_trait]
    impl Capability for AlwaysActiveCapability {
        fn name(&self) -> &str {
            "respond"
        }
        fn description(&self) -> &str {
            "reply to the user"
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
            unreachable!("always-active capabilities are never classified")
        }
        fn orchestrator_guide(&self) -> &OrchestratorGuide {
            unreachable!()
        }
        fn retry_policy(&self) -> RetryPolicy {
            RetryPolicy::default()
        }
        fn classify_error(&self, _error: &anyhow::Error) -> ErrorClassification {
            ErrorClassification::critical("unused")
        }
        async fn execute(&self, _state: &AgentState, _status: &StatusSink) -> anyhow::Result<Delta> {
            Ok(Delta::default())
        }
    }

    #[tokio::test]
    async fn always_active_capability_is_included_without_classifying() {
        let node = ClassificationNode::new(
            vec![Arc::new(AlwaysActiveCapability)],
            Arc::new(NoopLlmService),
        );
        let state = AgentState::default();
        let delta = node.run(&state).await.unwrap();
        let active = delta.active_capabilities.unwrap().unwrap();
        assert!(active.contains("respond"));
    }
}
