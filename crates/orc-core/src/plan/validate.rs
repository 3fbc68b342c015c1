//! Orchestrator validation pass and self-repair (§4.7 steps 3–4).

use std::collections::HashSet;

use crate::error::PlanValidationError;

use super::{Plan, Step, TERMINAL_CAPABILITIES};

/// Looks up the context types a capability `requires`, by name.
pub trait RequiresLookup {
    fn requires(&self, capability: &str) -> Vec<String>;
}

impl<F> RequiresLookup for F
where
    F: Fn(&str) -> Vec<String>,
{
    fn requires(&self, capability: &str) -> Vec<String> {
        self(capability)
    }
}

fn validate_except_terminal(
    plan: &Plan,
    active_capabilities: &HashSet<String>,
    requires: &dyn RequiresLookup,
) -> Result<(), PlanValidationError> {
    if plan.steps.is_empty() {
        return Err(PlanValidationError::Empty);
    }

    let mut seen_keys: HashSet<&str> = HashSet::new();
    // context_key -> expected_output, for steps seen so far.
    let mut produced: std::collections::HashMap<&str, Option<&str>> = std::collections::HashMap::new();

    for (index, step) in plan.steps.iter().enumerate() {
        if !seen_keys.insert(step.context_key.as_str()) {
            return Err(PlanValidationError::DuplicateContextKey(
                step.context_key.clone(),
            ));
        }

        if !active_capabilities.contains(&step.capability) {
            return Err(PlanValidationError::CapabilityNotActive {
                step: index,
                capability: step.capability.clone(),
            });
        }

        for input in &step.inputs {
            match produced.get(input.context_key.as_str()) {
                None => {
                    return Err(PlanValidationError::DanglingInputReference {
                        step: index,
                        context_type: input.context_type.clone(),
                        context_key: input.context_key.clone(),
                    });
                }
                Some(expected_output) => {
                    let matches = expected_output.as_deref() == Some(input.context_type.as_str());
                    if !matches {
                        return Err(PlanValidationError::ExpectedOutputMismatch {
                            step: index,
                            context_type: input.context_type.clone(),
                            context_key: input.context_key.clone(),
                            produced: expected_output.unwrap_or("<none>").to_string(),
                        });
                    }
                }
            }
        }

        let required_types = requires.requires(&step.capability);
        for required in &required_types {
            let satisfiable = step.inputs.iter().any(|i| &i.context_type == required);
            if !satisfiable {
                return Err(PlanValidationError::UnsatisfiedRequirement {
                    capability: step.capability.clone(),
                    context_type: required.clone(),
                });
            }
        }

        produced.insert(step.context_key.as_str(), step.expected_output.as_deref());
    }

    Ok(())
}

fn terminal_ok(plan: &Plan) -> bool {
    plan.steps
        .last()
        .is_some_and(|step| TERMINAL_CAPABILITIES.contains(&step.capability.as_str()))
}

/// Full validation pass (§4.7 step 3 + P2).
pub fn validate(
    plan: &Plan,
    active_capabilities: &HashSet<String>,
    requires: &dyn RequiresLookup,
) -> Result<(), PlanValidationError> {
    validate_except_terminal(plan, active_capabilities, requires)?;
    if !terminal_ok(plan) {
        let last = plan
            .steps
            .last()
            .map(|s| s.capability.clone())
            .unwrap_or_default();
        return Err(PlanValidationError::MissingTerminalStep(last));
    }
    Ok(())
}

/// Validate `plan`, self-repairing the single permitted case: a missing
/// terminal `respond`/`clarify` step (§4.7 step 4, Open Question 3 in
/// SPEC_FULL.md §9). Any other validation failure is returned as an error
/// for the caller to translate into `ErrorClassification::Replanning`.
pub fn repair_and_validate(
    mut plan: Plan,
    active_capabilities: &HashSet<String>,
    requires: &dyn RequiresLookup,
) -> Result<Plan, PlanValidationError> {
    validate_except_terminal(&plan, active_capabilities, requires)?;

    if terminal_ok(&plan) {
        return Ok(plan);
    }

    if !active_capabilities.contains("respond") {
        let last = plan
            .steps
            .last()
            .map(|s| s.capability.clone())
            .unwrap_or_default();
        return Err(PlanValidationError::MissingTerminalStep(last));
    }

    let mut candidate_key = "respond_auto".to_string();
    let mut suffix = 1;
    let existing: HashSet<&str> = plan.steps.iter().map(|s| s.context_key.as_str()).collect();
    while existing.contains(candidate_key.as_str()) {
        candidate_key = format!("respond_auto_{suffix}");
        suffix += 1;
    }

    plan.steps.push(Step {
        context_key: candidate_key,
        capability: "respond".to_string(),
        task_objective: "Respond to the user with the results gathered so far.".to_string(),
        success_criteria: "The user receives a helpful final reply.".to_string(),
        expected_output: None,
        parameters: None,
        inputs: Vec::new(),
    });

    validate(&plan, active_capabilities, requires)?;
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::InputRef;
    use chrono::Utc;

    fn no_requirements(_: &str) -> Vec<String> {
        Vec::new()
    }

    fn active(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn step(context_key: &str, capability: &str, expected_output: Option<&str>) -> Step {
        Step {
            context_key: context_key.into(),
            capability: capability.into(),
            task_objective: "do it".into(),
            success_criteria: "done".into(),
            expected_output: expected_output.map(String::from),
            parameters: None,
            inputs: Vec::new(),
        }
    }

    #[test]
    fn valid_two_step_plan_passes() {
        let plan = Plan::new(
            "weather",
            Utc::now(),
            vec![
                step("s1", "current_weather", Some("WEATHER")),
                step("s2", "respond", None),
            ],
        );
        let caps = active(&["current_weather", "respond"]);
        assert!(validate(&plan, &caps, &no_requirements).is_ok());
    }

    #[test]
    fn duplicate_context_key_rejected() {
        let plan = Plan::new(
            "t",
            Utc::now(),
            vec![step("s1", "respond", None), step("s1", "respond", None)],
        );
        let caps = active(&["respond"]);
        let err = validate(&plan, &caps, &no_requirements).unwrap_err();
        assert!(matches!(err, PlanValidationError::DuplicateContextKey(_)));
    }

    #[test]
    fn capability_not_active_rejected() {
        let plan = Plan::new("t", Utc::now(), vec![step("s1", "respond", None)]);
        let caps = active(&["classifier_only"]);
        let err = validate(&plan, &caps, &no_requirements).unwrap_err();
        assert!(matches!(err, PlanValidationError::CapabilityNotActive { .. }));
    }

    #[test]
    fn dangling_input_reference_rejected() {
        let mut plan = Plan::new("t", Utc::now(), vec![step("s1", "respond", None)]);
        plan.steps[0].inputs.push(InputRef {
            context_type: "WEATHER".into(),
            context_key: "nope".into(),
        });
        let caps = active(&["respond"]);
        let err = validate(&plan, &caps, &no_requirements).unwrap_err();
        assert!(matches!(err, PlanValidationError::DanglingInputReference { .. }));
    }

    #[test]
    fn missing_terminal_step_is_self_repaired() {
        let plan = Plan::new("t", Utc::now(), vec![step("s1", "current_weather", Some("WEATHER"))]);
        let caps = active(&["current_weather", "respond"]);
        let repaired = repair_and_validate(plan, &caps, &no_requirements).unwrap();
        assert_eq!(repaired.steps.len(), 2);
        assert_eq!(repaired.steps.last().unwrap().capability, "respond");
    }

    #[test]
    fn missing_terminal_step_without_respond_active_is_replanning_error() {
        let plan = Plan::new("t", Utc::now(), vec![step("s1", "current_weather", Some("WEATHER"))]);
        let caps = active(&["current_weather"]);
        let err = repair_and_validate(plan, &caps, &no_requirements).unwrap_err();
        assert!(matches!(err, PlanValidationError::MissingTerminalStep(_)));
    }

    #[test]
    fn unsatisfied_requirement_rejected() {
        let plan = Plan::new("t", Utc::now(), vec![step("s1", "respond", None)]);
        let caps = active(&["respond"]);
        let requires_weather = |cap: &str| -> Vec<String> {
            if cap == "respond" {
                vec!["WEATHER".to_string()]
            } else {
                Vec::new()
            }
        };
        let err = validate(&plan, &caps, &requires_weather).unwrap_err();
        assert!(matches!(err, PlanValidationError::UnsatisfiedRequirement { .. }));
    }
}
