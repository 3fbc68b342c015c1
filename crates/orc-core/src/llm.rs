//! LLM service boundary (§6 "LLM service contract", SPEC_FULL.md §10.6).
//!
//! Production provider wiring is out of scope; this module defines the
//! trait infrastructure nodes depend on plus two deterministic
//! implementations used for tests and the CLI demo.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm call timed out")]
    Timeout,
    #[error("llm returned output that failed schema validation: {0}")]
    InvalidStructuredOutput(String),
    #[error("llm call failed: {0}")]
    Provider(String),
}

/// The narrow surface infrastructure nodes call into (§6). `complete`
/// returns free text; `complete_structured` asks the provider to conform to
/// `schema` and returns the parsed JSON value.
#[async_trait]
pub trait LlmService: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError>;

    async fn complete_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &Value,
    ) -> Result<Value, LlmError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn LlmService) {}
};

/// Deterministic canned responses. All unit tests in this crate use this
/// service so node logic can be exercised without a network dependency.
pub struct NoopLlmService;

#[async_trait]
impl LlmService for NoopLlmService {
    async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String, LlmError> {
        Ok(String::new())
    }

    async fn complete_structured(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        _schema: &Value,
    ) -> Result<Value, LlmError> {
        Ok(Value::Null)
    }
}

/// Echoes the user prompt back for free text, and gives each of the three
/// pipeline call sites (task extraction, classification, plan generation) a
/// fixed, schema-appropriate structured answer so the `orc demo` CLI
/// subcommand can drive a turn end to end without a real provider. Every
/// generated plan has one step, calling the `respond` capability.
pub struct EchoLlmService;

#[async_trait]
impl LlmService for EchoLlmService {
    async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        Ok(format!("echo: {user_prompt}"))
    }

    async fn complete_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        _schema: &Value,
    ) -> Result<Value, LlmError> {
        if system_prompt.starts_with("Extract the user's current task") {
            return Ok(serde_json::json!({
                "task": user_prompt,
                "depends_on_chat_history": false,
                "depends_on_user_memory": false,
            }));
        }
        if system_prompt.starts_with("Decide whether this capability is relevant") {
            return Ok(serde_json::json!({ "matches": true }));
        }
        Ok(serde_json::json!({
            "steps": [{
                "context_key": "final",
                "capability": "respond",
                "task_objective": "reply to the user",
                "success_criteria": "assistant message sent",
                "expected_output": null,
                "parameters": null,
                "inputs": [],
            }]
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_service_returns_empty() {
        let svc = NoopLlmService;
        assert_eq!(svc.complete("sys", "hi").await.unwrap(), "");
    }

    #[tokio::test]
    async fn echo_service_echoes_prompt() {
        let svc = EchoLlmService;
        assert_eq!(svc.complete("sys", "hi").await.unwrap(), "echo: hi");
    }

    #[tokio::test]
    async fn echo_service_extracts_the_user_prompt_as_the_task() {
        let svc = EchoLlmService;
        let result = svc
            .complete_structured(
                "Extract the user's current task from the conversation. Report whether answering it needs prior chat history or stored user memory.",
                "book a flight",
                &Value::Null,
            )
            .await
            .unwrap();
        assert_eq!(result["task"], "book a flight");
    }

    #[tokio::test]
    async fn echo_service_always_proposes_a_one_step_respond_plan() {
        let svc = EchoLlmService;
        let result = svc
            .complete_structured("Produce a step-by-step execution plan", "anything", &Value::Null)
            .await
            .unwrap();
        assert_eq!(result["steps"][0]["capability"], "respond");
    }
}
