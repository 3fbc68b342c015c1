//! Agent State (§3 "Agent State", §4.3).
//!
//! The single flat record mutated by nodes. Mutation is cooperative: a node
//! returns a [`StateDelta`] (partial record) that the driver merges into
//! state; `messages` use an append-merge, every other field uses
//! last-write-wins. Delta fields that can legitimately be cleared to `None`
//! (e.g. `task.current_task`, `planning.execution_plan`) are represented as
//! `Option<Option<T>>` in the delta: outer `None` means "leave untouched",
//! `Some(None)` means "clear it".

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::context::ContextStore;
use crate::error::ErrorRecord;
use crate::plan::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// One entry in the ordered, append-only message sequence (§3 "Message").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// `task` subspace (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskState {
    pub current_task: Option<String>,
    pub depends_on_chat_history: bool,
    pub depends_on_user_memory: bool,
}

/// `planning` subspace (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanningState {
    pub active_capabilities: Option<HashSet<String>>,
    pub execution_plan: Option<Plan>,
    pub current_step_index: usize,
    pub plans_created: u32,
}

/// Slash-command-adjustable knobs (§3 "AgentControl", §6 slash-command
/// surface).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    Disabled,
    Selective,
    All,
}

impl Default for ApprovalMode {
    fn default() -> Self {
        ApprovalMode::Selective
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentControl {
    pub planning_mode: bool,
    pub approval_mode: ApprovalMode,
    pub debug: bool,
    pub bypass_task_extraction: bool,
    pub bypass_classification: bool,
}

/// Which kind of suspension the driver last raised (§4.9). `resume_turn`
/// consults this to decide what an approval actually applies to: approving a
/// plan still lets the loop re-evaluate per-step approval for step 0, but
/// approving a specific step must be consumed by running that step, not by
/// re-entering the loop and asking about it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingInterrupt {
    PlanApproval,
    StepApproval { step_index: usize },
}

impl Default for AgentControl {
    fn default() -> Self {
        Self {
            planning_mode: false,
            approval_mode: ApprovalMode::default(),
            debug: false,
            bypass_task_extraction: false,
            bypass_classification: false,
        }
    }
}

/// `control` subspace (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlState {
    pub has_error: bool,
    pub error_info: Option<ErrorRecord>,
    pub retry_count: u32,
    pub reclassification_count: u32,
    pub is_killed: bool,
    pub agent_control: AgentControl,
    pub pending_interrupt: Option<PendingInterrupt>,
}

/// Per-step bookkeeping kept in `results.step_results` (§3 `results`
/// subspace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub capability: String,
    pub context_key: String,
    pub succeeded: bool,
}

/// `results` subspace (§3): per-step bookkeeping plus the typed context
/// store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultsState {
    pub step_results: HashMap<String, StepResult>,
    pub context_store: ContextStore,
}

/// The per-conversation record passed through the graph (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentState {
    pub messages: Vec<Message>,
    pub task: TaskState,
    pub planning: PlanningState,
    pub control: ControlState,
    pub results: ResultsState,
}

/// Errors describing a violated state invariant (§3 "Invariants").
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateInvariantError {
    #[error("current_step_index ({index}) exceeds plan length ({len})")]
    StepIndexOutOfBounds { index: usize, len: usize },
    #[error("has_error is {has_error} but error_info presence is {error_info_present} (must agree)")]
    HasErrorMismatch { has_error: bool, error_info_present: bool },
    #[error("current_step_index is {0} but no execution_plan is set")]
    StepIndexWithoutPlan(usize),
}

impl AgentState {
    /// Check the invariants listed in §3. Intended for tests and for
    /// defensive assertions around delta application, not for hot-path
    /// validation (the driver trusts well-formed node code in production).
    pub fn check_invariants(&self) -> Result<(), StateInvariantError> {
        if let Some(plan) = &self.planning.execution_plan {
            if self.planning.current_step_index > plan.steps.len() {
                return Err(StateInvariantError::StepIndexOutOfBounds {
                    index: self.planning.current_step_index,
                    len: plan.steps.len(),
                });
            }
        } else if self.planning.current_step_index != 0 {
            return Err(StateInvariantError::StepIndexWithoutPlan(
                self.planning.current_step_index,
            ));
        }

        if self.control.has_error != self.control.error_info.is_some() {
            return Err(StateInvariantError::HasErrorMismatch {
                has_error: self.control.has_error,
                error_info_present: self.control.error_info.is_some(),
            });
        }

        Ok(())
    }

    /// Merge a node's delta into this state (§4.3).
    pub fn apply(&mut self, delta: StateDelta) {
        self.messages.extend(delta.append_messages);

        if let Some(v) = delta.current_task {
            self.task.current_task = v;
        }
        if let Some(v) = delta.depends_on_chat_history {
            self.task.depends_on_chat_history = v;
        }
        if let Some(v) = delta.depends_on_user_memory {
            self.task.depends_on_user_memory = v;
        }
        if let Some(v) = delta.active_capabilities {
            self.planning.active_capabilities = v;
        }
        if let Some(v) = delta.execution_plan {
            self.planning.execution_plan = v;
        }
        if let Some(v) = delta.current_step_index {
            self.planning.current_step_index = v;
        }
        if let Some(v) = delta.plans_created {
            self.planning.plans_created = v;
        }
        if let Some(v) = delta.has_error {
            self.control.has_error = v;
        }
        if let Some(v) = delta.error_info {
            self.control.error_info = v;
        }
        if let Some(v) = delta.retry_count {
            self.control.retry_count = v;
        }
        if let Some(v) = delta.reclassification_count {
            self.control.reclassification_count = v;
        }
        if let Some(v) = delta.is_killed {
            self.control.is_killed = v;
        }
        if let Some(v) = delta.agent_control {
            self.control.agent_control = v;
        }
        for (key, result) in delta.step_results {
            self.results.step_results.insert(key, result);
        }
        if let Some(v) = delta.context_store {
            self.results.context_store = v;
        }
    }
}

/// A partial update returned by a node, merged into [`AgentState`] by the
/// driver (§4.3).
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    pub append_messages: Vec<Message>,
    pub current_task: Option<Option<String>>,
    pub depends_on_chat_history: Option<bool>,
    pub depends_on_user_memory: Option<bool>,
    pub active_capabilities: Option<Option<HashSet<String>>>,
    pub execution_plan: Option<Option<Plan>>,
    pub current_step_index: Option<usize>,
    pub plans_created: Option<u32>,
    pub has_error: Option<bool>,
    pub error_info: Option<Option<ErrorRecord>>,
    pub retry_count: Option<u32>,
    pub reclassification_count: Option<u32>,
    pub is_killed: Option<bool>,
    pub agent_control: Option<AgentControl>,
    pub step_results: HashMap<String, StepResult>,
    pub context_store: Option<ContextStore>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.append_messages.push(message);
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.has_error = Some(false);
        self.error_info = Some(None);
        self
    }

    pub fn set_error(mut self, error: ErrorRecord) -> Self {
        self.has_error = Some(true);
        self.error_info = Some(Some(error));
        self
    }

    pub fn with_step_result(mut self, context_key: impl Into<String>, result: StepResult) -> Self {
        self.step_results.insert(context_key.into(), result);
        self
    }
}
