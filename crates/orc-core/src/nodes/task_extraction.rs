//! Task extraction node (§4.5).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::llm::LlmService;
use crate::registry::InfrastructureNode;
use crate::state::{AgentState, MessageRole, StateDelta};

const SYSTEM_PROMPT: &str = "Extract the user's current task from the conversation. \
Report whether answering it needs prior chat history or stored user memory.";

/// Determines `task.current_task` and the `depends_on_*` flags from the most
/// recent user message (§4.5 step 1–2). Bypassed by the router entirely when
/// `AgentControl.bypass_task_extraction` is set (§6 `/task:off`).
pub struct TaskExtractionNode {
    llm: Arc<dyn LlmService>,
}

impl TaskExtractionNode {
    pub fn new(llm: Arc<dyn LlmService>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl InfrastructureNode for TaskExtractionNode {
    fn name(&self) -> &str {
        "task_extraction"
    }

    async fn run(&self, state: &AgentState) -> anyhow::Result<StateDelta> {
        let last_user_message = state
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or("");

        let schema = json!({
            "type": "object",
            "properties": {
                "task": {"type": "string"},
                "depends_on_chat_history": {"type": "boolean"},
                "depends_on_user_memory": {"type": "boolean"},
            },
        });

        let result = self
            .llm
            .complete_structured(SYSTEM_PROMPT, last_user_message, &schema)
            .await?;

        let current_task = result
            .get("task")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .filter(|s| !s.is_empty());
        let depends_on_chat_history = result
            .get("depends_on_chat_history")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let depends_on_user_memory = result
            .get("depends_on_user_memory")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        Ok(StateDelta {
            current_task: Some(current_task),
            depends_on_chat_history: Some(depends_on_chat_history),
            depends_on_user_memory: Some(depends_on_user_memory),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::NoopLlmService;
    use crate::state::Message;

    #[tokio::test]
    async fn empty_llm_response_leaves_task_unset() {
        let node = TaskExtractionNode::new(Arc::new(NoopLlmService));
        let mut state = AgentState::default();
        state.messages.push(Message::user("what's the weather in Prague?"));
        let delta = node.run(&state).await.unwrap();
        assert_eq!(delta.current_task, Some(None));
        assert_eq!(delta.depends_on_chat_history, Some(false));
    }
}
