//! Error taxonomy (§3, §7).
//!
//! `ErrorClassification` is plain data the router switches on; it is not a
//! Rust error trait object. Capabilities still raise ordinary `anyhow::Error`
//! from `execute()` — the wrapper asks the capability's `error_classifier`
//! to translate that into a classification.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capability::RetryPolicy;

/// Severity attached to every failure; tells the router whether to retry,
/// replan, reclassify, report, or terminate (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Retriable,
    Replanning,
    Reclassification,
    Critical,
    Fatal,
}

/// The result of a capability's `error_classifier` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub severity: Severity,
    pub user_message: String,
    pub metadata: serde_json::Value,
}

impl ErrorClassification {
    pub fn new(severity: Severity, user_message: impl Into<String>) -> Self {
        Self {
            severity,
            user_message: user_message.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn retriable(user_message: impl Into<String>) -> Self {
        Self::new(Severity::Retriable, user_message)
    }

    pub fn replanning(user_message: impl Into<String>) -> Self {
        Self::new(Severity::Replanning, user_message)
    }

    pub fn reclassification(user_message: impl Into<String>) -> Self {
        Self::new(Severity::Reclassification, user_message)
    }

    pub fn critical(user_message: impl Into<String>) -> Self {
        Self::new(Severity::Critical, user_message)
    }

    pub fn fatal(user_message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, user_message)
    }
}

/// A captured failure, attached to `control.error_info` by the capability
/// execution wrapper (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub capability_name: String,
    pub original_error: String,
    pub user_message: String,
    pub technical_details: String,
    pub classification: ErrorClassification,
    pub execution_time: Duration,
    pub retry_policy: RetryPolicy,
}

/// `error_type` values used in the Error node's structured report (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    Timeout,
    StepFailure,
    SafetyLimit,
    RetriableExhausted,
    ReclassificationExhausted,
    Critical,
    Infrastructure,
    Killed,
}

/// Registration-time failures (§4.1). Always CRITICAL; the process must
/// refuse to start.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate registration for name {0:?}")]
    DuplicateName(String),
    #[error("capability {capability:?} references unregistered context type {context_type:?}")]
    UnknownContextType {
        capability: String,
        context_type: String,
    },
    #[error("required infrastructure node {0:?} is missing")]
    MissingInfrastructureNode(String),
    #[error("unknown capability {0:?}")]
    UnknownCapability(String),
    #[error("unknown infrastructure node {0:?}")]
    UnknownNode(String),
}

/// Plan validation failures (§4.7). The orchestrator node returns this as a
/// plain `Err`; the driver's node-error envelope (§4.8, §10.2) is what
/// translates it into `ErrorClassification::Replanning`, mirroring how
/// `execute_step` translates a capability's `Err`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanValidationError {
    #[error("duplicate context_key {0:?} in plan")]
    DuplicateContextKey(String),
    #[error("step {step} references capability {capability:?} which is not active")]
    CapabilityNotActive { step: usize, capability: String },
    #[error("step {step} input {context_type:?} references unknown context_key {context_key:?}")]
    DanglingInputReference {
        step: usize,
        context_type: String,
        context_key: String,
    },
    #[error(
        "step {step} input {context_type:?} references context_key {context_key:?} produced as {produced:?}, expected {context_type:?}"
    )]
    ExpectedOutputMismatch {
        step: usize,
        context_type: String,
        context_key: String,
        produced: String,
    },
    #[error("plan has no steps")]
    Empty,
    #[error("final step capability {0:?} is not `respond` or `clarify`")]
    MissingTerminalStep(String),
    #[error("capability {capability:?} requires context type {context_type:?} not satisfiable from inputs")]
    UnsatisfiedRequirement {
        capability: String,
        context_type: String,
    },
}

/// Typed-context-store failures (§4.2). Corresponds to testable property P6;
/// always CRITICAL.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextStoreError {
    #[error("context ({context_type:?}, {key:?}) already stored this turn")]
    DuplicateKey { context_type: String, key: String },
    #[error("context ({context_type:?}, {key:?}) failed schema validation: {reason}")]
    SchemaMismatch {
        context_type: String,
        key: String,
        reason: String,
    },
    #[error("no context stored under ({context_type:?}, {key:?})")]
    NotFound { context_type: String, key: String },
}
