//! Plan persistence format (§6 "Plan persistence format (JSON)").
//!
//! The wire format wraps `steps` in a `__metadata__` envelope and represents
//! each `inputs` entry as a single-key object `{ "CTX_TYPE": "context_key" }`
//! rather than the flat struct used internally — `Plan`/`Step` keep their
//! own `derive(Serialize, Deserialize)` for checkpoint snapshots, and this
//! module is the sole translator to/from the spec's on-disk shape (P10).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use super::{InputRef, Plan, Step};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanMetadata {
    pub version: String,
    pub original_task: String,
    pub created_at: DateTime<Utc>,
    pub serialization_type: String,
}

/// Failures while reading a persisted plan document.
#[derive(Debug, Error)]
pub enum PlanPersistError {
    #[error("document is missing the __metadata__ object")]
    MissingMetadata,
    #[error("invalid __metadata__: {0}")]
    InvalidMetadata(serde_json::Error),
    #[error("document is missing the steps array")]
    MissingSteps,
    #[error("step {index} is missing field {field:?}")]
    MissingStepField { index: usize, field: &'static str },
    #[error("step {index} field {field:?} has the wrong type")]
    WrongStepFieldType { index: usize, field: &'static str },
    #[error("step {index} input entry must be a single-key object, found {found} keys")]
    MalformedInput { index: usize, found: usize },
}

fn input_to_wire(input: &InputRef) -> Value {
    json!({ input.context_type.clone(): input.context_key.clone() })
}

fn input_from_wire(index: usize, value: &Value) -> Result<InputRef, PlanPersistError> {
    let object = value
        .as_object()
        .ok_or(PlanPersistError::MalformedInput { index, found: 0 })?;
    if object.len() != 1 {
        return Err(PlanPersistError::MalformedInput {
            index,
            found: object.len(),
        });
    }
    let (context_type, key_value) = object.iter().next().expect("checked len == 1");
    let context_key = key_value
        .as_str()
        .ok_or(PlanPersistError::MalformedInput { index, found: 1 })?
        .to_string();
    Ok(InputRef {
        context_type: context_type.clone(),
        context_key,
    })
}

fn step_to_wire(step: &Step) -> Value {
    json!({
        "context_key": step.context_key,
        "capability": step.capability,
        "task_objective": step.task_objective,
        "success_criteria": step.success_criteria,
        "expected_output": step.expected_output,
        "parameters": step.parameters,
        "inputs": step.inputs.iter().map(input_to_wire).collect::<Vec<_>>(),
    })
}

fn str_field(
    obj: &serde_json::Map<String, Value>,
    index: usize,
    field: &'static str,
) -> Result<String, PlanPersistError> {
    obj.get(field)
        .ok_or(PlanPersistError::MissingStepField { index, field })?
        .as_str()
        .ok_or(PlanPersistError::WrongStepFieldType { index, field })
        .map(str::to_string)
}

fn step_from_wire(index: usize, value: &Value) -> Result<Step, PlanPersistError> {
    let obj = value
        .as_object()
        .ok_or(PlanPersistError::WrongStepFieldType { index, field: "<step>" })?;

    let inputs = match obj.get("inputs") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| input_from_wire(index, item))
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(PlanPersistError::WrongStepFieldType { index, field: "inputs" }),
        None => Vec::new(),
    };

    Ok(Step {
        context_key: str_field(obj, index, "context_key")?,
        capability: str_field(obj, index, "capability")?,
        task_objective: str_field(obj, index, "task_objective")?,
        success_criteria: str_field(obj, index, "success_criteria")?,
        expected_output: obj
            .get("expected_output")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        parameters: obj.get("parameters").cloned().filter(|v| !v.is_null()),
        inputs,
    })
}

/// Serialize a `Plan` to its persisted JSON document.
pub fn to_json(plan: &Plan) -> Value {
    json!({
        "__metadata__": {
            "version": plan.version,
            "original_task": plan.original_task,
            "created_at": plan.created_at.to_rfc3339(),
            "serialization_type": "pending_execution_plan",
        },
        "steps": plan.steps.iter().map(step_to_wire).collect::<Vec<_>>(),
    })
}

/// Parse a persisted JSON document back into a `Plan` (P10 round-trip).
pub fn from_json(value: &Value) -> Result<Plan, PlanPersistError> {
    let metadata_value = value
        .get("__metadata__")
        .ok_or(PlanPersistError::MissingMetadata)?;
    let metadata: PlanMetadata = serde_json::from_value(metadata_value.clone())
        .map_err(PlanPersistError::InvalidMetadata)?;

    let steps_value = value
        .get("steps")
        .and_then(Value::as_array)
        .ok_or(PlanPersistError::MissingSteps)?;

    let steps = steps_value
        .iter()
        .enumerate()
        .map(|(index, step)| step_from_wire(index, step))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Plan {
        original_task: metadata.original_task,
        created_at: metadata.created_at,
        version: metadata.version,
        steps,
    })
}
