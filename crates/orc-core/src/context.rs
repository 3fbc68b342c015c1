//! Typed Context store (§4.2).
//!
//! A two-level mapping `context_type → (key → ContextValue)`. Keys are
//! unique within a type; contexts are append-only within a conversation
//! turn (P6). Retrieval is O(1).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ContextStoreError;
use crate::plan::Step;

/// A context type name, e.g. `"TURBINE_DATA"`, `"WEATHER_REPORT"`.
pub type ContextType = String;

/// One stored value, always carrying its full coordinate and the metadata
/// an LLM needs to address it (§4.2 invariants).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextValue {
    pub context_type: String,
    pub key: String,
    pub payload: serde_json::Value,
    pub schema_version: u32,
    pub summary: String,
    pub access_hint: String,
}

/// How strictly [`ContextStore::extract_from_step`] treats unmet
/// constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractMode {
    Hard,
    Soft,
}

/// Raised by `extract_from_step` in `Hard` mode when a constraint cannot be
/// resolved from the step's declared inputs. The caller (the capability
/// execution wrapper, §4.8) converts this into
/// `ErrorClassification::Replanning`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("step is missing required context type(s): {0:?}")]
pub struct ContextExtractError(pub Vec<String>);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextStore {
    entries: HashMap<String, HashMap<String, ContextValue>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under `(context_type, key)`. `validate` receives the
    /// payload and is expected to check it against the registered schema for
    /// `context_type` (the registry, not this module, owns schemas).
    ///
    /// Fails with `DuplicateKey` if the coordinate was already written this
    /// turn (P6) — this is always a CRITICAL error at the call site.
    pub fn store(
        &mut self,
        context_type: impl Into<String>,
        key: impl Into<String>,
        payload: serde_json::Value,
        schema_version: u32,
        summary: impl Into<String>,
        access_hint: impl Into<String>,
        validate: impl FnOnce(&serde_json::Value) -> Result<(), String>,
    ) -> Result<(), ContextStoreError> {
        let context_type = context_type.into();
        let key = key.into();

        if self
            .entries
            .get(&context_type)
            .is_some_and(|by_key| by_key.contains_key(&key))
        {
            return Err(ContextStoreError::DuplicateKey {
                context_type,
                key,
            });
        }

        validate(&payload).map_err(|reason| ContextStoreError::SchemaMismatch {
            context_type: context_type.clone(),
            key: key.clone(),
            reason,
        })?;

        let value = ContextValue {
            context_type: context_type.clone(),
            key: key.clone(),
            payload,
            schema_version,
            summary: summary.into(),
            access_hint: access_hint.into(),
        };

        self.entries.entry(context_type).or_default().insert(key, value);
        Ok(())
    }

    pub fn get(&self, context_type: &str, key: &str) -> Option<&ContextValue> {
        self.entries.get(context_type)?.get(key)
    }

    pub fn human_summary(&self, context_type: &str, key: &str) -> Option<&str> {
        self.get(context_type, key).map(|v| v.summary.as_str())
    }

    pub fn access_hint(&self, context_type: &str, key: &str) -> Option<&str> {
        self.get(context_type, key).map(|v| v.access_hint.as_str())
    }

    /// Resolve each of `constraints` by consulting `step.inputs` for a
    /// matching `(context_type → context_key)` pair, then looking that key
    /// up in the store.
    pub fn extract_from_step(
        &self,
        step: &Step,
        constraints: &[ContextType],
        mode: ExtractMode,
    ) -> Result<HashMap<ContextType, ContextValue>, ContextExtractError> {
        let mut resolved = HashMap::new();
        let mut missing = Vec::new();

        for constraint in constraints {
            let key = step
                .inputs
                .iter()
                .find(|input| &input.context_type == constraint)
                .map(|input| input.context_key.as_str());

            let value = key.and_then(|key| self.get(constraint, key));

            match value {
                Some(value) => {
                    resolved.insert(constraint.clone(), value.clone());
                }
                None => missing.push(constraint.clone()),
            }
        }

        if mode == ExtractMode::Hard && !missing.is_empty() {
            return Err(ContextExtractError(missing));
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::InputRef;

    fn always_ok(_: &serde_json::Value) -> Result<(), String> {
        Ok(())
    }

    #[test]
    fn store_then_get_round_trips() {
        let mut store = ContextStore::new();
        store
            .store(
                "WEATHER",
                "k1",
                serde_json::json!({"temp_c": 21}),
                1,
                "weather in Prague",
                "context.WEATHER.k1",
                always_ok,
            )
            .unwrap();

        let value = store.get("WEATHER", "k1").unwrap();
        assert_eq!(value.payload, serde_json::json!({"temp_c": 21}));
        assert_eq!(store.access_hint("WEATHER", "k1"), Some("context.WEATHER.k1"));
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let mut store = ContextStore::new();
        store
            .store("WEATHER", "k1", serde_json::json!({}), 1, "s", "h", always_ok)
            .unwrap();

        let err = store
            .store("WEATHER", "k1", serde_json::json!({}), 1, "s2", "h2", always_ok)
            .unwrap_err();

        assert!(matches!(err, ContextStoreError::DuplicateKey { .. }));
    }

    #[test]
    fn schema_validation_failure_is_reported() {
        let mut store = ContextStore::new();
        let err = store
            .store("WEATHER", "k1", serde_json::json!({}), 1, "s", "h", |_| {
                Err("missing field temp_c".to_string())
            })
            .unwrap_err();
        assert!(matches!(err, ContextStoreError::SchemaMismatch { .. }));
    }

    #[test]
    fn extract_from_step_hard_mode_fails_on_missing_constraint() {
        let mut store = ContextStore::new();
        store
            .store("WEATHER", "k1", serde_json::json!({}), 1, "s", "h", always_ok)
            .unwrap();

        let step = Step {
            context_key: "step2".into(),
            capability: "respond".into(),
            task_objective: "respond".into(),
            success_criteria: "ok".into(),
            expected_output: None,
            parameters: None,
            inputs: vec![InputRef {
                context_type: "WEATHER".into(),
                context_key: "k1".into(),
            }],
        };

        let ok = store
            .extract_from_step(&step, &["WEATHER".to_string()], ExtractMode::Hard)
            .unwrap();
        assert_eq!(ok.len(), 1);

        let missing = store.extract_from_step(
            &step,
            &["TURBINE_DATA".to_string()],
            ExtractMode::Hard,
        );
        assert!(missing.is_err());

        let soft = store
            .extract_from_step(&step, &["TURBINE_DATA".to_string()], ExtractMode::Soft)
            .unwrap();
        assert!(soft.is_empty());
    }
}
