//! Graph driver (§5): ties the router, infrastructure nodes, and the
//! capability execution wrapper together into the per-turn loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::mpsc;

use crate::capability::StatusSink;
use crate::error::{ErrorClassification, ErrorRecord, PlanValidationError, RegistryError, Severity};
use crate::execution::execute_step;
use crate::interrupt::{Interrupt, ResumeCommand, should_interrupt};
use crate::llm::LlmError;
use crate::registry::Registry;
use crate::router::{RouterLimits, RouterTarget, decide};
use crate::state::{AgentState, PendingInterrupt};

/// Resolved from [`crate::config::OrchestratorConfig`] at driver
/// construction time.
pub struct DriverLimits {
    pub router: RouterLimits,
    pub graph_recursion_limit: u32,
    pub max_execution_time: Duration,
}

/// Classifies an infrastructure node's raw `Err` the same way `execute_step`
/// classifies a capability's (§4.8, §10.2): a node never gets to bypass the
/// router by propagating out of the turn. `anyhow::Context::context` wraps
/// the original cause, so this walks the whole chain rather than assuming
/// the domain error is the outermost one.
fn classify_node_error(node: &str, error: anyhow::Error) -> ErrorRecord {
    let classification = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<PlanValidationError>())
        .map(|_| {
            ErrorClassification::replanning("the generated plan failed validation and needs to be redone")
        })
        .or_else(|| {
            error
                .chain()
                .find_map(|cause| cause.downcast_ref::<RegistryError>())
                .map(|e| ErrorClassification::critical(e.to_string()))
        })
        .or_else(|| {
            error.chain().find_map(|cause| cause.downcast_ref::<LlmError>()).map(|e| match e {
                LlmError::Timeout | LlmError::Provider(_) => {
                    ErrorClassification::retriable("the language model service is temporarily unavailable")
                }
                LlmError::InvalidStructuredOutput(_) => {
                    ErrorClassification::replanning("the language model returned output that could not be used")
                }
            })
        })
        .unwrap_or_else(|| ErrorClassification::critical(error.to_string()));

    ErrorRecord {
        capability_name: node.to_string(),
        original_error: error.to_string(),
        user_message: classification.user_message.clone(),
        technical_details: format!("{error:?}"),
        classification,
        execution_time: Duration::ZERO,
        retry_policy: crate::capability::RetryPolicy::default(),
    }
}

fn safety_limit_error(message: &str) -> ErrorRecord {
    ErrorRecord {
        capability_name: "driver".to_string(),
        original_error: message.to_string(),
        user_message: "The task took too long and had to be stopped.".to_string(),
        technical_details: message.to_string(),
        classification: ErrorClassification::new(Severity::Fatal, message),
        execution_time: Duration::ZERO,
        retry_policy: crate::capability::RetryPolicy::default(),
    }
}

/// What a driven turn produces (§4.9 "interrupt(payload) → suspend"): either
/// a completed turn, ready for the Gateway to persist and surface to the
/// user, or a suspension awaiting an approval reply via [`Driver::resume_turn`].
pub enum TurnOutcome {
    Finished(AgentState),
    Suspended { state: AgentState, interrupt: Interrupt },
}

impl TurnOutcome {
    /// The state as it stands regardless of whether the turn finished or
    /// suspended — what the Gateway checkpoints either way.
    pub fn state(&self) -> &AgentState {
        match self {
            TurnOutcome::Finished(state) => state,
            TurnOutcome::Suspended { state, .. } => state,
        }
    }
}

/// Whether the just-produced plan needs sign-off before its first step runs
/// (§4.7 step 5): under `ApprovalMode::All`, or whenever the turn started in
/// planning mode, every freshly (re)generated plan is surfaced for review.
fn plan_approval_interrupt(state: &AgentState) -> Option<Interrupt> {
    let control = &state.control.agent_control;
    let plan = state.planning.execution_plan.as_ref()?;
    let surfaced = control.planning_mode || control.approval_mode == crate::state::ApprovalMode::All;
    if surfaced {
        Some(Interrupt {
            payload: json!({"kind": "plan_approval", "plan": plan}),
        })
    } else {
        None
    }
}

/// Drives one user turn to completion: `AgentState` in, final `AgentState`
/// (post error-node reporting, if applicable) out. Node-by-node dispatch
/// strictly follows the router's decision (§4.4); this type owns only the
/// two safety nets the router itself does not enforce — the graph
/// recursion limit and the wall-clock timeout (§5) — plus the suspension
/// points the nodes themselves cannot express without depending back on the
/// driver (§4.9).
pub struct Driver {
    registry: Arc<Registry>,
    limits: DriverLimits,
}

impl Driver {
    pub fn new(registry: Arc<Registry>, limits: DriverLimits) -> Self {
        Self { registry, limits }
    }

    /// Run a turn, discarding capability status updates.
    pub async fn run_turn(&self, state: AgentState) -> anyhow::Result<TurnOutcome> {
        let (tx, _rx) = mpsc::unbounded_channel();
        self.run_turn_with_status(state, StatusSink::new(tx)).await
    }

    /// Resume a turn suspended by a prior [`TurnOutcome::Suspended`]. A plan
    /// approval (with or without an edit) continues the loop at the next hop,
    /// which re-evaluates per-step approval normally. A step approval must be
    /// consumed here instead: re-entering the loop would re-evaluate
    /// `should_interrupt` on the same un-advanced step and suspend again with
    /// the identical payload, so the approved step is run directly via
    /// `execute_step` before the loop resumes. A rejection, of either kind,
    /// is treated as a replanning error so the router sends the turn back
    /// through the orchestrator rather than silently discarding the user's
    /// objection.
    pub async fn resume_turn(
        &self,
        mut state: AgentState,
        resume: ResumeCommand,
        status: StatusSink,
    ) -> anyhow::Result<TurnOutcome> {
        let pending = state.control.pending_interrupt.take();
        if resume.approved {
            if let Some(plan) = resume.replacement {
                state.planning.execution_plan = Some(plan);
                state.planning.current_step_index = 0;
            } else if let Some(PendingInterrupt::StepApproval { step_index }) = pending {
                let step = state
                    .planning
                    .execution_plan
                    .as_ref()
                    .and_then(|plan| plan.step_at(step_index))
                    .cloned();
                if let Some(step) = step {
                    if let Some(capability) = self.registry.get_capability(&step.capability) {
                        let delta = execute_step(capability.as_ref(), &step, &state, &status).await;
                        state.apply(delta);
                    }
                }
            }
        } else {
            let reason = resume.reason.unwrap_or_else(|| "the user rejected the pending step".to_string());
            state.control.has_error = true;
            state.control.error_info = Some(ErrorRecord {
                capability_name: "driver".to_string(),
                original_error: reason.clone(),
                user_message: reason.clone(),
                technical_details: reason.clone(),
                classification: ErrorClassification::replanning(reason),
                execution_time: Duration::ZERO,
                retry_policy: crate::capability::RetryPolicy::default(),
            });
        }
        self.run_turn_with_status(state, status).await
    }

    pub async fn run_turn_with_status(
        &self,
        mut state: AgentState,
        status: StatusSink,
    ) -> anyhow::Result<TurnOutcome> {
        let started = Instant::now();
        let mut hops: u32 = 0;

        loop {
            if started.elapsed() > self.limits.max_execution_time {
                state.control.has_error = true;
                state.control.error_info = Some(safety_limit_error("execution time limit exceeded"));
                return self.report_and_finish(state).await;
            }

            hops += 1;
            if hops > self.limits.graph_recursion_limit {
                state.control.has_error = true;
                state.control.error_info =
                    Some(safety_limit_error("graph recursion limit exceeded"));
                return self.report_and_finish(state).await;
            }

            let decision = decide(&state, &self.limits.router).await;
            state.apply(decision.delta);

            let target = match decision.target {
                RouterTarget::End => return Ok(TurnOutcome::Finished(state)),
                RouterTarget::Node(name) => name,
            };

            if let Some(node) = self.registry.get_node(&target) {
                match node.run(&state).await {
                    Ok(delta) => state.apply(delta),
                    Err(error) => {
                        let record = classify_node_error(&target, error);
                        state.control.has_error = true;
                        state.control.error_info = Some(record);
                        continue;
                    }
                }
                if target == "orchestrator" {
                    if let Some(interrupt) = plan_approval_interrupt(&state) {
                        state.control.pending_interrupt = Some(PendingInterrupt::PlanApproval);
                        return Ok(TurnOutcome::Suspended { state, interrupt });
                    }
                }
                continue;
            }

            if let Some(capability) = self.registry.get_capability(&target) {
                let step = state
                    .planning
                    .execution_plan
                    .as_ref()
                    .and_then(|plan| plan.step_at(state.planning.current_step_index))
                    .cloned();
                let Some(step) = step else {
                    state.control.has_error = true;
                    state.control.error_info = Some(safety_limit_error(
                        "router dispatched a capability with no corresponding plan step",
                    ));
                    return self.report_and_finish(state).await;
                };

                if should_interrupt(
                    state.control.agent_control.approval_mode,
                    capability.requires_approval(),
                    false,
                ) {
                    let interrupt = Interrupt {
                        payload: json!({"kind": "step_approval", "step": step}),
                    };
                    state.control.pending_interrupt = Some(PendingInterrupt::StepApproval {
                        step_index: state.planning.current_step_index,
                    });
                    return Ok(TurnOutcome::Suspended { state, interrupt });
                }

                let delta = execute_step(capability.as_ref(), &step, &state, &status).await;
                state.apply(delta);
                continue;
            }

            state.control.has_error = true;
            state.control.error_info = Some(safety_limit_error(&format!(
                "router dispatched unknown target {target:?}"
            )));
            return self.report_and_finish(state).await;
        }
    }

    async fn report_and_finish(&self, mut state: AgentState) -> anyhow::Result<TurnOutcome> {
        if let Some(error_node) = self.registry.get_node("error") {
            let delta = error_node.run(&state).await?;
            state.apply(delta);
        }
        Ok(TurnOutcome::Finished(state))
    }
}
