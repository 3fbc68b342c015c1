//! Approval / interrupt machinery (§4.9).

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::llm::LlmService;
use crate::plan::Plan;
use crate::state::ApprovalMode;

/// The payload a capability or the orchestrator surfaces when it suspends
/// awaiting approval (§4.9 "interrupt(payload) → suspend").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interrupt {
    pub payload: serde_json::Value,
}

/// What the driver resumes a suspended node with.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeCommand {
    pub approved: bool,
    pub reason: Option<String>,
    pub replacement: Option<Plan>,
}

impl ResumeCommand {
    pub fn approve() -> Self {
        Self {
            approved: true,
            reason: None,
            replacement: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: Some(reason.into()),
            replacement: None,
        }
    }

    pub fn edit(plan: Plan) -> Self {
        Self {
            approved: true,
            reason: None,
            replacement: Some(plan),
        }
    }
}

/// Whether `mode` permits an interrupt for a step whose capability declares
/// `requires_approval`, or whose produced artifact matched a configured
/// pattern (§4.9 "Policy modes").
pub fn should_interrupt(mode: ApprovalMode, requires_approval: bool, matches_configured_pattern: bool) -> bool {
    match mode {
        ApprovalMode::Disabled => false,
        ApprovalMode::Selective => requires_approval || matches_configured_pattern,
        ApprovalMode::All => true,
    }
}

const APPROVAL_SYSTEM_PROMPT: &str =
    "Classify the user's reply to a pending approval request as approve, reject, edit, or other.";

/// The four outcomes the Gateway's approval classification can produce
/// (§4.11 step 3). `Other` is distinct from a rejection: it means the
/// message is unrelated to the pending approval and should be treated as a
/// fresh turn, discarding the interrupt.
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalReplyVerdict {
    Approve,
    Reject(String),
    Edit(Plan),
    Other,
}

/// Classify a stripped user message as an approval reply (§4.9). Fail-safe:
/// any ambiguity within the approve/reject/edit space, a parse failure, or a
/// transport error becomes a rejection rather than a silent approval. Only
/// an explicit `other` verdict from the classifier is passed through as
/// `Other`.
pub async fn classify_approval_reply(llm: &dyn LlmService, message: &str) -> ApprovalReplyVerdict {
    let schema = json!({
        "type": "object",
        "properties": {
            "verdict": {"type": "string", "enum": ["approve", "reject", "edit", "other"]},
            "reason": {"type": "string"},
            "plan": {"type": "object"},
        },
    });

    let result = match llm.complete_structured(APPROVAL_SYSTEM_PROMPT, message, &schema).await {
        Ok(value) => value,
        Err(_) => return ApprovalReplyVerdict::Reject("approval classification failed".to_string()),
    };

    match result.get("verdict").and_then(|v| v.as_str()) {
        Some("approve") => ApprovalReplyVerdict::Approve,
        Some("reject") => {
            let reason = result
                .get("reason")
                .and_then(|v| v.as_str())
                .unwrap_or("rejected")
                .to_string();
            ApprovalReplyVerdict::Reject(reason)
        }
        Some("edit") => match result.get("plan").and_then(|p| crate::plan::from_json(p).ok()) {
            Some(plan) => ApprovalReplyVerdict::Edit(plan),
            None => ApprovalReplyVerdict::Reject("edit reply did not contain a parseable plan".to_string()),
        },
        Some("other") => ApprovalReplyVerdict::Other,
        _ => ApprovalReplyVerdict::Reject("ambiguous approval reply".to_string()),
    }
}
