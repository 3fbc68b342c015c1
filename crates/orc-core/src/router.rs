//! Router (§4.4): the sole decision function invoked after every node. Pure
//! with respect to state; the only side effect is the retry backoff sleep
//! (step 2d).

use crate::error::Severity;
use crate::state::{AgentState, StateDelta};

/// Where the driver dispatches next. `Node` carries either an
/// infrastructure node name (`task_extraction`, `classifier`,
/// `orchestrator`, `error`) or a capability name — both are resolved
/// through the same [`crate::registry::Registry`] namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterTarget {
    End,
    Node(String),
}

/// The two bounds the router enforces (§4.1 config, SPEC_FULL.md §10.3
/// defaults: 2 and 1 respectively).
pub struct RouterLimits {
    pub max_planning_attempts: u32,
    pub max_reclassifications: u32,
}

/// A router decision: where to go next, plus whatever state mutation led to
/// that decision (retry-count increment, error clearing, and so on). The
/// driver applies `delta` to state before dispatching to `target`.
pub struct Decision {
    pub target: RouterTarget,
    pub delta: StateDelta,
}

impl Decision {
    fn to(target: impl Into<String>) -> Self {
        Self {
            target: RouterTarget::Node(target.into()),
            delta: StateDelta::default(),
        }
    }

    fn end() -> Self {
        Self {
            target: RouterTarget::End,
            delta: StateDelta::default(),
        }
    }

    fn to_with(target: impl Into<String>, delta: StateDelta) -> Self {
        Self {
            target: RouterTarget::Node(target.into()),
            delta,
        }
    }
}

/// Evaluate the decision procedure (§4.4 steps 1–7), strictly in order,
/// returning the first match. Step 2d sleeps for the backoff delay before
/// returning — every other step is synchronous and side-effect-free (P1).
pub async fn decide(state: &AgentState, limits: &RouterLimits) -> Decision {
    // Step 1.
    if state.control.is_killed {
        return Decision::end();
    }

    // Step 2.
    if state.control.has_error {
        let Some(error_info) = &state.control.error_info else {
            // Invariant violation (has_error without error_info) — treated
            // as an infrastructure failure rather than panicking the driver.
            return Decision::to("error");
        };
        let severity = error_info.classification.severity;

        match severity {
            Severity::Fatal => return Decision::end(),
            Severity::Critical => return Decision::to("error"),
            Severity::Retriable => {
                if state.control.retry_count < error_info.retry_policy.max_attempts {
                    let delay = error_info
                        .retry_policy
                        .delay_for_attempt(state.control.retry_count);
                    tokio::time::sleep(delay).await;
                    let delta = StateDelta {
                        retry_count: Some(state.control.retry_count + 1),
                        ..StateDelta::default().clear_error()
                    };
                    return Decision::to_with(error_info.capability_name.clone(), delta);
                }
                return Decision::to("error");
            }
            Severity::Replanning => {
                if state.planning.plans_created < limits.max_planning_attempts {
                    let delta = StateDelta {
                        execution_plan: Some(None),
                        ..StateDelta::default().clear_error()
                    };
                    return Decision::to_with("orchestrator", delta);
                }
                return Decision::to("error");
            }
            Severity::Reclassification => {
                if state.control.reclassification_count < limits.max_reclassifications {
                    let delta = StateDelta {
                        reclassification_count: Some(state.control.reclassification_count + 1),
                        execution_plan: Some(None),
                        active_capabilities: Some(None),
                        ..StateDelta::default().clear_error()
                    };
                    return Decision::to_with("classifier", delta);
                }
                return Decision::to("error");
            }
        }
    }

    // Step 3.
    if state.task.current_task.is_none() && !state.control.agent_control.bypass_task_extraction {
        return Decision::to("task_extraction");
    }

    // Step 4.
    if state.planning.active_capabilities.is_none() && !state.control.agent_control.bypass_classification
    {
        return Decision::to("classifier");
    }

    // Step 5.
    let Some(plan) = &state.planning.execution_plan else {
        return Decision::to("orchestrator");
    };

    // Step 6.
    if state.planning.current_step_index >= plan.steps.len() {
        return Decision::end();
    }

    // Step 7.
    Decision::to(plan.steps[state.planning.current_step_index].capability.clone())
}
