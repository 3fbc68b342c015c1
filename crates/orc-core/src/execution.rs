//! Capability execution wrapper (§4.8): the envelope the driver calls
//! instead of invoking a capability's `execute` directly. Resolves the
//! step's declared inputs, times the call, and translates success/failure
//! into the control-subspace bookkeeping the router depends on.

use std::time::{Duration, Instant};

use crate::capability::{Capability, StatusSink};
use crate::context::ExtractMode;
use crate::error::{ErrorClassification, ErrorRecord};
use crate::plan::Step;
use crate::state::{AgentState, StateDelta, StepResult};

/// Run one step. Never returns `Err`: failures are captured in the returned
/// delta's `error_info` for the router to act on (§4.8 step 4).
pub async fn execute_step(
    capability: &dyn Capability,
    step: &Step,
    state: &AgentState,
    status: &StatusSink,
) -> StateDelta {
    if let Err(missing) =
        state
            .results
            .context_store
            .extract_from_step(step, capability.requires(), ExtractMode::Hard)
    {
        let record = ErrorRecord {
            capability_name: capability.name().to_string(),
            original_error: missing.to_string(),
            user_message: "the plan is missing information this step needs".to_string(),
            technical_details: format!("{missing:?}"),
            classification: ErrorClassification::replanning(
                "a plan step referenced context that was never produced",
            ),
            execution_time: Duration::ZERO,
            retry_policy: capability.retry_policy(),
        };
        return StateDelta::new()
            .set_error(record)
            .with_step_result(
                step.context_key.clone(),
                StepResult {
                    capability: capability.name().to_string(),
                    context_key: step.context_key.clone(),
                    succeeded: false,
                },
            );
    }

    let started = Instant::now();
    match capability.execute(state, status).await {
        Ok(mut delta) => {
            delta.has_error = Some(false);
            delta.error_info = Some(None);
            delta.retry_count = Some(0);
            delta.current_step_index = Some(state.planning.current_step_index + 1);
            delta.step_results.insert(
                step.context_key.clone(),
                StepResult {
                    capability: capability.name().to_string(),
                    context_key: step.context_key.clone(),
                    succeeded: true,
                },
            );
            delta
        }
        Err(error) => {
            let execution_time = started.elapsed();
            let classification = capability.classify_error(&error);
            let record = ErrorRecord {
                capability_name: capability.name().to_string(),
                original_error: error.to_string(),
                user_message: classification.user_message.clone(),
                technical_details: format!("{error:?}"),
                classification,
                execution_time,
                retry_policy: capability.retry_policy(),
            };
            StateDelta::new()
                .set_error(record)
                .with_step_result(
                    step.context_key.clone(),
                    StepResult {
                        capability: capability.name().to_string(),
                        context_key: step.context_key.clone(),
                        succeeded: false,
                    },
                )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{ClassifierGuide, OrchestratorGuide, RetryPolicy};
    use crate::error::Severity;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct SucceedingCapability;

    #[async_trait]
    impl Capability for SucceedingCapability {
        fn name(&self) -> &str {
            "respond"
        }
        fn description(&self) -> &str {
            "reply"
        }
        fn provides(&self) -> &[String] {
            &[]
        }
        fn requires(&self) -> &[String] {
            &[]
        }
        fn classifier_guide(&self) -> &ClassifierGuide {
            unreachable!()
        }
        fn orchestrator_guide(&self) -> &OrchestratorGuide {
            unreachable!()
        }
        fn retry_policy(&self) -> RetryPolicy {
            RetryPolicy::default()
        }
        async fn execute(&self, _state: &AgentState, _status: &StatusSink) -> anyhow::Result<StateDelta> {
            Ok(StateDelta::default())
        }
    }

    struct FailingCapability;

    #[async_trait]
    impl Capability for FailingCapability {
        fn name(&self) -> &str {
            "current_weather"
        }
        fn description(&self) -> &str {
            "fetch weather"
        }
        fn provides(&self) -> &[String] {
            &[]
        }
        fn requires(&self) -> &[String] {
            &[]
        }
        fn classifier_guide(&self) -> &ClassifierGuide {
            unreachable!()
        }
        fn orchestrator_guide(&self) -> &OrchestratorGuide {
            unreachable!()
        }
        fn retry_policy(&self) -> RetryPolicy {
            RetryPolicy::default()
        }
        fn classify_error(&self, _error: &anyhow::Error) -> ErrorClassification {
            ErrorClassification::retriable("the weather service is temporarily unavailable")
        }
        async fn execute(&self, _state: &AgentState, _status: &StatusSink) -> anyhow::Result<StateDelta> {
            anyhow::bail!("connection refused")
        }
    }

    fn step(capability: &str) -> Step {
        Step {
            context_key: "s1".into(),
            capability: capability.into(),
            task_objective: "do it".into(),
            success_criteria: "done".into(),
            expected_output: None,
            parameters: None,
            inputs: Vec::new(),
        }
    }

    fn status_sink() -> StatusSink {
        let (tx, _rx) = mpsc::unbounded_channel();
        StatusSink::new(tx)
    }

    #[tokio::test]
    async fn success_advances_step_index_and_clears_error() {
        let state = AgentState::default();
        let delta = execute_step(&SucceedingCapability, &step("respond"), &state, &status_sink()).await;
        assert_eq!(delta.current_step_index, Some(1));
        assert_eq!(delta.has_error, Some(false));
        assert!(delta.step_results["s1"].succeeded);
    }

    #[tokio::test]
    async fn failure_records_classification_without_advancing() {
        let state = AgentState::default();
        let delta = execute_step(&FailingCapability, &step("current_weather"), &state, &status_sink()).await;
        assert_eq!(delta.current_step_index, None);
        assert_eq!(delta.has_error, Some(true));
        let error = delta.error_info.unwrap().unwrap();
        assert_eq!(error.classification.severity, Severity::Retriable);
        assert!(!delta.step_results["s1"].succeeded);
    }

    #[tokio::test]
    async fn missing_required_context_is_replanning_error() {
        struct RequiresWeather(Vec<String>);
        #[async_trait]
        impl Capability for RequiresWeather {
            fn name(&self) -> &str {
                "respond"
            }
            fn description(&self) -> &str {
                "reply"
            }
            fn provides(&self) -> &[String] {
                &[]
            }
            fn requires(&self) -> &[String] {
                &self.0
            }
            fn classifier_guide(&self) -> &ClassifierGuide {
                unreachable!()
            }
            fn orchestrator_guide(&self) -> &OrchestratorGuide {
                unreachable!()
            }
            fn retry_policy(&self) -> RetryPolicy {
                RetryPolicy::default()
            }
            async fn execute(&self, _state: &AgentState, _status: &StatusSink) -> anyhow::Result<StateDelta> {
                Ok(StateDelta::default())
            }
        }

        let capability = RequiresWeather(vec!["WEATHER_REPORT".to_string()]);
        let state = AgentState::default();
        let delta = execute_step(&capability, &step("respond"), &state, &status_sink()).await;
        assert_eq!(delta.has_error, Some(true));
        let error = delta.error_info.unwrap().unwrap();
        assert_eq!(error.classification.severity, Severity::Replanning);
    }
}
