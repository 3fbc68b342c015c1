//! Orchestrator node (§4.7): generates the execution plan from the active
//! capability set's `OrchestratorGuide`s, then validates and self-repairs it
//! via [`crate::plan::repair_and_validate`].

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use crate::capability::Capability;
use crate::llm::LlmService;
use crate::plan::{InputRef, Plan, RequiresLookup, Step, repair_and_validate};
use crate::registry::InfrastructureNode;
use crate::state::{AgentState, StateDelta};

const SYSTEM_PROMPT: &str =
    "Produce a step-by-step execution plan using only the listed capabilities. \
The final step must use `respond` or `clarify`.";

struct CapabilitiesRequires<'a>(&'a [Arc<dyn Capability>]);

impl RequiresLookup for CapabilitiesRequires<'_> {
    fn requires(&self, capability: &str) -> Vec<String> {
        self.0
            .iter()
            .find(|c| c.name() == capability)
            .map(|c| c.requires().to_vec())
            .unwrap_or_default()
    }
}

fn input_from_value(value: &Value) -> Option<InputRef> {
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    let (context_type, key) = object.iter().next()?;
    Some(InputRef {
        context_type: context_type.clone(),
        context_key: key.as_str()?.to_string(),
    })
}

fn step_from_value(value: &Value) -> Option<Step> {
    let object = value.as_object()?;
    Some(Step {
        context_key: object.get("context_key")?.as_str()?.to_string(),
        capability: object.get("capability")?.as_str()?.to_string(),
        task_objective: object.get("task_objective")?.as_str()?.to_string(),
        success_criteria: object.get("success_criteria")?.as_str()?.to_string(),
        expected_output: object
            .get("expected_output")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        parameters: object.get("parameters").cloned().filter(|v| !v.is_null()),
        inputs: object
            .get("inputs")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(input_from_value).collect())
            .unwrap_or_default(),
    })
}

fn plan_from_llm_value(value: &Value, original_task: &str) -> anyhow::Result<Plan> {
    let steps = value
        .get("steps")
        .and_then(Value::as_array)
        .context("orchestrator LLM response is missing a steps array")?
        .iter()
        .map(|s| step_from_value(s).context("malformed plan step in orchestrator LLM response"))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Plan::new(original_task, Utc::now(), steps))
}

/// Builds and validates one [`Plan`] per invocation (§4.7 steps 1–4).
/// `plans_created` is incremented unconditionally; the router enforces
/// `max_planning_attempts` (§4.4 step 2e) before re-invoking this node.
///
/// Takes the capability list directly for the same reason
/// [`crate::nodes::ClassificationNode`] does: the registry is assembled
/// from these nodes, so a dependency back on it would be circular.
pub struct OrchestratorNode {
    capabilities: Vec<Arc<dyn Capability>>,
    llm: Arc<dyn LlmService>,
}

impl OrchestratorNode {
    pub fn new(capabilities: Vec<Arc<dyn Capability>>, llm: Arc<dyn LlmService>) -> Self {
        Self { capabilities, llm }
    }
}

#[async_trait]
impl InfrastructureNode for OrchestratorNode {
    fn name(&self) -> &str {
        "orchestrator"
    }

    async fn run(&self, state: &AgentState) -> anyhow::Result<StateDelta> {
        let active = state.planning.active_capabilities.clone().unwrap_or_default();
        let task = state.task.current_task.clone().unwrap_or_default();

        let mut guided: Vec<_> = self
            .capabilities
            .iter()
            .filter(|c| active.contains(c.name()))
            .collect();
        guided.sort_by_key(|c| c.orchestrator_guide().order);

        let prompt = format!(
            "Task: {task}\n\nAvailable capabilities (in presentation order): {}",
            guided
                .iter()
                .map(|c| format!(
                    "{name}: {instructions}",
                    name = c.name(),
                    instructions = c.orchestrator_guide().instructions
                ))
                .collect::<Vec<_>>()
                .join("\n")
        );

        let schema = json!({
            "type": "object",
            "properties": {"steps": {"type": "array"}},
        });

        let raw = self
            .llm
            .complete_structured(SYSTEM_PROMPT, &prompt, &schema)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;

        let plan = plan_from_llm_value(&raw, &task)?;
        let requires = CapabilitiesRequires(&self.capabilities);
        let plan = repair_and_validate(plan, &active, &requires).context("plan failed validation")?;

        Ok(StateDelta {
            execution_plan: Some(Some(plan)),
            current_step_index: Some(0),
            plans_created: Some(state.planning.plans_created + 1),
            ..Default::default()
        })
    }
}
