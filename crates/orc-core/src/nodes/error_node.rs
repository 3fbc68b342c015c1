//! Error node (§4.10): the terminal node reached whenever the router's
//! error dispatch exhausts retries, reclassifications, or hits a CRITICAL
//! or FATAL classification. Produces the user-visible assistant message and
//! clears `control` so a later turn starts clean.
//!
//! Uses its own implicit classifier that always reports FATAL (§4.10) —
//! there is no `classify_error` call here at all, since the error node
//! never raises and never re-enters the router through the error path.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ErrorType, Severity};
use crate::llm::LlmService;
use crate::registry::InfrastructureNode;
use crate::state::{AgentState, Message, StateDelta};

/// §4.10 "Report structure": classifies the terminal reason into one of the
/// eight `error_type` values from the severity and the counters that led
/// here, since by the time the error node runs the router has already
/// decided recovery is exhausted.
fn classify_error_type(state: &AgentState) -> ErrorType {
    if state.control.is_killed {
        return ErrorType::Killed;
    }
    match state.control.error_info.as_ref().map(|e| e.classification.severity) {
        Some(Severity::Retriable) => ErrorType::RetriableExhausted,
        Some(Severity::Reclassification) => ErrorType::ReclassificationExhausted,
        Some(Severity::Critical) => ErrorType::Critical,
        Some(Severity::Fatal) => ErrorType::Critical,
        Some(Severity::Replanning) => ErrorType::StepFailure,
        None => ErrorType::Infrastructure,
    }
}

fn technical_report(state: &AgentState, error_type: ErrorType) -> String {
    let succeeded: Vec<&str> = state
        .results
        .step_results
        .values()
        .filter(|r| r.succeeded)
        .map(|r| r.context_key.as_str())
        .collect();
    let failed: Vec<&str> = state
        .results
        .step_results
        .values()
        .filter(|r| !r.succeeded)
        .map(|r| r.context_key.as_str())
        .collect();

    let details = state
        .control
        .error_info
        .as_ref()
        .map(|e| e.technical_details.as_str())
        .unwrap_or("<none>");

    format!(
        "error_type={error_type:?} task={task:?} retry_count={retry_count} \
reclassification_count={reclassification_count} succeeded_steps={succeeded:?} \
failed_steps={failed:?} technical_details={details}",
        task = state.task.current_task,
        retry_count = state.control.retry_count,
        reclassification_count = state.control.reclassification_count,
    )
}

pub struct ErrorNode {
    llm: Arc<dyn LlmService>,
}

impl ErrorNode {
    pub fn new(llm: Arc<dyn LlmService>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl InfrastructureNode for ErrorNode {
    fn name(&self) -> &str {
        "error"
    }

    async fn run(&self, state: &AgentState) -> anyhow::Result<StateDelta> {
        let user_message = state
            .control
            .error_info
            .as_ref()
            .map(|r| r.user_message.clone())
            .unwrap_or_else(|| "Something went wrong and the task could not be completed.".to_string());

        let error_type = classify_error_type(state);

        // Best-effort natural-language analysis (§4.10): never fails the node.
        let analysis = self
            .llm
            .complete(
                "Explain this failure to the user in at most 500 tokens.",
                &technical_report(state, error_type),
            )
            .await
            .ok();

        let mut message = user_message;
        if let Some(analysis) = analysis.filter(|a| !a.is_empty()) {
            message.push_str("\n\n");
            message.push_str(&analysis);
        }
        if state.control.agent_control.debug {
            message.push_str("\n\n(debug) ");
            message.push_str(&technical_report(state, error_type));
        }

        Ok(StateDelta::new()
            .with_message(Message::assistant(message))
            .clear_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::RetryPolicy;
    use crate::error::{ErrorClassification, ErrorRecord};
    use crate::llm::NoopLlmService;

    fn sample_error() -> ErrorRecord {
        ErrorRecord {
            capability_name: "current_weather".to_string(),
            original_error: "connection refused".to_string(),
            user_message: "I couldn't fetch the weather right now.".to_string(),
            technical_details: "ConnectionRefused at weather_api.rs:42".to_string(),
            classification: ErrorClassification::critical("upstream unavailable"),
            execution_time: std::time::Duration::from_millis(5),
            retry_policy: RetryPolicy::default(),
        }
    }

    #[tokio::test]
    async fn debug_off_hides_technical_details() {
        let mut state = AgentState::default();
        state.control.error_info = Some(sample_error());
        state.control.agent_control.debug = false;

        let node = ErrorNode::new(Arc::new(NoopLlmService));
        let delta = node.run(&state).await.unwrap();
        let message = &delta.append_messages[0].content;
        assert!(message.contains("couldn't fetch the weather"));
        assert!(!message.contains("ConnectionRefused"));
    }

    #[tokio::test]
    async fn debug_on_includes_technical_details() {
        let mut state = AgentState::default();
        state.control.error_info = Some(sample_error());
        state.control.agent_control.debug = true;

        let node = ErrorNode::new(Arc::new(NoopLlmService));
        let delta = node.run(&state).await.unwrap();
        let message = &delta.append_messages[0].content;
        assert!(message.contains("ConnectionRefused"));
    }

    #[tokio::test]
    async fn error_is_cleared_after_reporting() {
        let mut state = AgentState::default();
        state.control.error_info = Some(sample_error());
        state.control.has_error = true;

        let node = ErrorNode::new(Arc::new(NoopLlmService));
        let delta = node.run(&state).await.unwrap();
        assert_eq!(delta.has_error, Some(false));
        assert_eq!(delta.error_info, Some(None));
    }

    #[tokio::test]
    async fn killed_state_classifies_as_killed_in_debug_report() {
        let mut state = AgentState::default();
        state.control.is_killed = true;
        state.control.agent_control.debug = true;

        let node = ErrorNode::new(Arc::new(NoopLlmService));
        let delta = node.run(&state).await.unwrap();
        let message = &delta.append_messages[0].content;
        assert!(message.contains("Killed"));
    }
}
