//! Gateway (§4.11): the only way a user turn enters the system.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::checkpoint::Checkpointer;
use crate::interrupt::{ApprovalReplyVerdict, Interrupt, ResumeCommand, classify_approval_reply};
use crate::llm::LlmService;
use crate::state::{AgentControl, AgentState, ApprovalMode, Message};

/// What the Gateway persists between turns alongside the conversation
/// history: the live state plus whatever interrupt a prior turn suspended
/// on, if any.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    state: AgentState,
    pending_interrupt: Option<Interrupt>,
}

/// What a processed turn yields the caller (§4.11 step 5).
pub enum GatewayOutcome {
    /// A fresh `AgentState` ready to be driven through the graph.
    AgentState(AgentState),
    /// The prior run was suspended; resume it with this verdict instead of
    /// starting a new turn.
    Resume(ResumeCommand),
    /// The input was only slash-commands and whitespace (P7): `AgentControl`
    /// has already been updated, but there is no message to drive a turn
    /// with, so no LLM calls or further state changes happen this turn.
    ControlOnly(AgentState),
}

pub struct GatewayResult {
    pub outcome: GatewayOutcome,
    pub slash_commands_processed: Vec<String>,
    pub approval_detected: bool,
}

/// Recognized slash commands, matched case-insensitively and only as a
/// leading run of whitespace-separated tokens (§4.11 step 2, §6).
fn apply_slash_command(control: &mut AgentControl, token: &str) -> bool {
    match token.to_ascii_lowercase().as_str() {
        "/planning" => control.planning_mode = true,
        "/planning:off" => control.planning_mode = false,
        "/approval:disabled" => control.approval_mode = ApprovalMode::Disabled,
        "/approval:selective" => control.approval_mode = ApprovalMode::Selective,
        "/approval:all" => control.approval_mode = ApprovalMode::All,
        "/debug:on" => control.debug = true,
        "/debug:off" => control.debug = false,
        "/task:off" => control.bypass_task_extraction = true,
        "/caps:off" => control.bypass_classification = true,
        _ => return false,
    }
    true
}

/// Strip leading slash-commands from `input`, applying each to `control` in
/// order. Returns the remaining message text and the list of commands that
/// matched.
fn strip_slash_commands(input: &str, control: &mut AgentControl) -> (String, Vec<String>) {
    let mut processed = Vec::new();
    let mut rest = input.trim_start();

    loop {
        let Some(token) = rest.split_whitespace().next() else {
            break;
        };
        if !token.starts_with('/') || !apply_slash_command(control, token) {
            break;
        }
        processed.push(token.to_string());
        rest = rest[token.len()..].trim_start();
    }

    (rest.to_string(), processed)
}

/// The entry point for every user turn (§4.11).
pub struct Gateway {
    checkpointer: Arc<dyn Checkpointer>,
    llm: Arc<dyn LlmService>,
}

impl Gateway {
    pub fn new(checkpointer: Arc<dyn Checkpointer>, llm: Arc<dyn LlmService>) -> Self {
        Self { checkpointer, llm }
    }

    async fn load(&self, thread_id: &str) -> Snapshot {
        match self.checkpointer.get(thread_id).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_default(),
            _ => Snapshot::default(),
        }
    }

    /// The checkpointed state a resume needs to hand back to `Driver::resume_turn`.
    ///
    /// Callers only need this when [`process_message`](Gateway::process_message)
    /// returns [`GatewayOutcome::Resume`]: the state it suspended on lives in
    /// the checkpoint, not in the `GatewayResult`, since the Gateway's own
    /// job ends at classifying the approval reply.
    pub async fn state_for_resume(&self, thread_id: &str) -> AgentState {
        self.load(thread_id).await.state
    }

    /// Persist the current state (and any still-pending interrupt) for
    /// `thread_id`. Intended to be called by the driver once it has
    /// produced the next state, not by the Gateway itself mid-turn.
    pub async fn save(&self, thread_id: &str, state: &AgentState, pending_interrupt: Option<Interrupt>) {
        let snapshot = Snapshot {
            state: state.clone(),
            pending_interrupt,
        };
        if let Ok(bytes) = serde_json::to_vec(&snapshot) {
            let _ = self.checkpointer.put(thread_id, bytes).await;
        }
    }

    /// Process one user turn (§4.11 steps 1–5). `user_input` is the raw,
    /// un-stripped message.
    pub async fn process_message(&self, thread_id: &str, user_input: &str) -> GatewayResult {
        let snapshot = self.load(thread_id).await;
        let mut state = snapshot.state;

        let (stripped, slash_commands_processed) =
            strip_slash_commands(user_input, &mut state.control.agent_control);

        if let Some(_interrupt) = snapshot.pending_interrupt {
            match classify_approval_reply(self.llm.as_ref(), &stripped).await {
                ApprovalReplyVerdict::Approve => {
                    return GatewayResult {
                        outcome: GatewayOutcome::Resume(ResumeCommand::approve()),
                        slash_commands_processed,
                        approval_detected: true,
                    };
                }
                ApprovalReplyVerdict::Reject(reason) => {
                    return GatewayResult {
                        outcome: GatewayOutcome::Resume(ResumeCommand::reject(reason)),
                        slash_commands_processed,
                        approval_detected: true,
                    };
                }
                ApprovalReplyVerdict::Edit(plan) => {
                    return GatewayResult {
                        outcome: GatewayOutcome::Resume(ResumeCommand::edit(plan)),
                        slash_commands_processed,
                        approval_detected: true,
                    };
                }
                ApprovalReplyVerdict::Other => {
                    // Fall through: discard the interrupt, treat this as a
                    // fresh turn (§4.11 step 3 "other").
                }
            }
        }

        if stripped.trim().is_empty() {
            return GatewayResult {
                outcome: GatewayOutcome::ControlOnly(state),
                slash_commands_processed,
                approval_detected: false,
            };
        }

        state.messages.push(Message::user(stripped));
        state.task = Default::default();
        state.planning = Default::default();
        let agent_control = state.control.agent_control.clone();
        state.control = Default::default();
        state.control.agent_control = agent_control;

        GatewayResult {
            outcome: GatewayOutcome::AgentState(state),
            slash_commands_processed,
            approval_detected: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::InMemoryCheckpointer;
    use crate::llm::NoopLlmService;

    fn gateway() -> Gateway {
        Gateway::new(Arc::new(InMemoryCheckpointer::new()), Arc::new(NoopLlmService))
    }

    #[tokio::test]
    async fn fresh_thread_produces_fresh_state_with_message_appended() {
        let gw = gateway();
        let result = gw.process_message("t1", "what's the weather?").await;
        match result.outcome {
            GatewayOutcome::AgentState(state) => {
                assert_eq!(state.messages.len(), 1);
                assert_eq!(state.messages[0].content, "what's the weather?");
            }
            _ => panic!("expected a fresh state"),
        }
        assert!(result.slash_commands_processed.is_empty());
    }

    #[tokio::test]
    async fn state_for_resume_returns_the_state_saved_alongside_an_interrupt() {
        let gw = gateway();
        let mut state = AgentState::default();
        state.messages.push(Message::assistant("partial progress"));
        gw.save("t1", &state, Some(Interrupt { payload: serde_json::json!({}) })).await;

        let loaded = gw.state_for_resume("t1").await;
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages[0].content, "partial progress");
    }

    #[tokio::test]
    async fn leading_slash_commands_are_stripped_and_applied() {
        let gw = gateway();
        let result = gw
            .process_message("t1", "/planning /debug:on what's the weather?")
            .await;
        assert_eq!(result.slash_commands_processed, vec!["/planning", "/debug:on"]);
        match result.outcome {
            GatewayOutcome::AgentState(state) => {
                assert!(state.control.agent_control.planning_mode);
                assert!(state.control.agent_control.debug);
                assert_eq!(state.messages[0].content, "what's the weather?");
            }
            _ => panic!("expected a fresh state"),
        }
    }

    #[tokio::test]
    async fn slash_commands_only_match_as_a_leading_run() {
        let gw = gateway();
        let result = gw.process_message("t1", "please run /planning now").await;
        assert!(result.slash_commands_processed.is_empty());
        match result.outcome {
            GatewayOutcome::AgentState(state) => {
                assert_eq!(state.messages[0].content, "please run /planning now");
            }
            _ => panic!("expected a fresh state"),
        }
    }

    #[tokio::test]
    async fn pending_interrupt_with_ambiguous_reply_rejects() {
        let checkpointer = Arc::new(InMemoryCheckpointer::new());
        let gw = Gateway::new(checkpointer.clone(), Arc::new(NoopLlmService));
        gw.save("t1", &AgentState::default(), Some(Interrupt { payload: serde_json::json!({}) }))
            .await;

        let result = gw.process_message("t1", "uh, maybe?").await;
        assert!(result.approval_detected);
        match result.outcome {
            GatewayOutcome::Resume(cmd) => assert!(!cmd.approved),
            _ => panic!("expected a resume command"),
        }
    }

    #[tokio::test]
    async fn input_of_only_slash_commands_produces_control_only_outcome() {
        let gw = gateway();
        let result = gw.process_message("t1", "/planning /debug:on").await;
        assert_eq!(result.slash_commands_processed, vec!["/planning", "/debug:on"]);
        assert!(!result.approval_detected);
        match result.outcome {
            GatewayOutcome::ControlOnly(state) => {
                assert!(state.control.agent_control.planning_mode);
                assert!(state.control.agent_control.debug);
                assert!(state.messages.is_empty());
                assert!(state.task.current_task.is_none());
                assert!(state.planning.execution_plan.is_none());
            }
            _ => panic!("expected a control-only outcome"),
        }
    }

    #[tokio::test]
    async fn slash_commands_with_trailing_whitespace_only_is_still_control_only() {
        let gw = gateway();
        let result = gw.process_message("t1", "/approval:all   ").await;
        match result.outcome {
            GatewayOutcome::ControlOnly(state) => {
                assert_eq!(state.control.agent_control.approval_mode, ApprovalMode::All);
            }
            _ => panic!("expected a control-only outcome"),
        }
    }
}
