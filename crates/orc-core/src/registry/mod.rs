//! Registry (§4.1): the authoritative, ordered view of every capability,
//! infrastructure node, context type, and declarative service registered in
//! the process.
//!
//! The source auto-registers components via import-time decorators; per
//! §9 ("Source patterns that require re-architecture") this is replaced
//! with an explicit declarative registry. Rust has no dynamic
//! `module_path`+`symbol_name` loading to mirror literally, so "lazy load"
//! is reinterpreted as: callers hand the registry already-constructed
//! `Arc<dyn Capability>`/`Arc<dyn InfrastructureNode>` trait objects, and
//! `initialize()` validates the registrations without touching them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::capability::Capability;
use crate::error::RegistryError;
use crate::state::{AgentState, StateDelta};

/// Names of infrastructure nodes the router unconditionally depends on
/// (§4.1 "an infrastructure node required by the router is missing").
pub const REQUIRED_INFRASTRUCTURE_NODES: [&str; 4] =
    ["task_extraction", "classifier", "orchestrator", "error"];

/// A registered context type's schema validator (§4.2 "schema-validated
/// payload").
#[derive(Clone)]
pub struct ContextClassDescriptor {
    pub name: String,
    pub schema_version: u32,
    pub validate: fn(&serde_json::Value) -> Result<(), String>,
}

fn accept_any(_: &serde_json::Value) -> Result<(), String> {
    Ok(())
}

impl ContextClassDescriptor {
    /// A context type with no schema constraints beyond being present.
    pub fn unchecked(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema_version: 1,
            validate: accept_any,
        }
    }
}

/// A unit that serves the orchestration pipeline itself (§2, GLOSSARY
/// "Infrastructure node"). Declared in the registry but never appears as a
/// plan step.
#[async_trait]
pub trait InfrastructureNode: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, state: &AgentState) -> anyhow::Result<StateDelta>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn InfrastructureNode) {}
};

/// The config object passed to [`Registry::register`] (§4.1 `register`).
#[derive(Default)]
pub struct RegistryConfig {
    pub capabilities: Vec<Arc<dyn Capability>>,
    pub context_classes: Vec<ContextClassDescriptor>,
    pub infrastructure_nodes: Vec<Arc<dyn InfrastructureNode>>,
    pub data_sources: Vec<String>,
    pub services: Vec<String>,
    pub framework_exclusions: HashSet<String>,
}

/// The process-wide, read-only-after-initialization component registry
/// (§4.1, §5 "Shared-resource policy").
#[derive(Default)]
pub struct Registry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
    context_classes: HashMap<String, ContextClassDescriptor>,
    infrastructure_nodes: HashMap<String, Arc<dyn InfrastructureNode>>,
    data_sources: HashSet<String>,
    services: HashSet<String>,
    initialized: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a declared config, validating uniqueness of names as they are
    /// added. Names are shared across the capability and infrastructure
    /// node namespaces because the router dispatches both by the same kind
    /// of name (§4.4).
    pub fn register(&mut self, config: RegistryConfig) -> Result<(), RegistryError> {
        for excluded in &config.framework_exclusions {
            self.capabilities.remove(excluded);
            self.infrastructure_nodes.remove(excluded);
        }

        for class in config.context_classes {
            if self.context_classes.contains_key(&class.name) {
                return Err(RegistryError::DuplicateName(class.name));
            }
            self.context_classes.insert(class.name.clone(), class);
        }

        for node in config.infrastructure_nodes {
            let name = node.name().to_string();
            if self.capabilities.contains_key(&name) || self.infrastructure_nodes.contains_key(&name) {
                return Err(RegistryError::DuplicateName(name));
            }
            self.infrastructure_nodes.insert(name, node);
        }

        for capability in config.capabilities {
            let name = capability.name().to_string();
            if self.capabilities.contains_key(&name) || self.infrastructure_nodes.contains_key(&name) {
                return Err(RegistryError::DuplicateName(name));
            }
            self.capabilities.insert(name, capability);
        }

        self.data_sources.extend(config.data_sources);
        self.services.extend(config.services);

        Ok(())
    }

    /// Resolve all registrations (§4.1 `initialize`).
    ///
    /// Order is: context types → data sources → infrastructure nodes →
    /// services → capabilities are already populated by `register`; this
    /// step performs only the cross-reference validation pass, since there
    /// is no lazy module loading to perform in this implementation (see
    /// module docs).
    pub fn initialize(&mut self) -> Result<(), RegistryError> {
        for node_name in REQUIRED_INFRASTRUCTURE_NODES {
            if !self.infrastructure_nodes.contains_key(node_name) {
                return Err(RegistryError::MissingInfrastructureNode(node_name.to_string()));
            }
        }

        for capability in self.capabilities.values() {
            for context_type in capability.provides().iter().chain(capability.requires()) {
                if !self.context_classes.contains_key(context_type) {
                    return Err(RegistryError::UnknownContextType {
                        capability: capability.name().to_string(),
                        context_type: context_type.clone(),
                    });
                }
            }
        }

        self.initialized = true;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn get_capability(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    pub fn get_all_capabilities(&self) -> Vec<Arc<dyn Capability>> {
        self.capabilities.values().cloned().collect()
    }

    pub fn get_always_active_capability_names(&self) -> HashSet<String> {
        self.capabilities
            .values()
            .filter(|c| c.always_active())
            .map(|c| c.name().to_string())
            .collect()
    }

    pub fn get_context_class(&self, context_type: &str) -> Option<&ContextClassDescriptor> {
        self.context_classes.get(context_type)
    }

    pub fn get_node(&self, name: &str) -> Option<Arc<dyn InfrastructureNode>> {
        self.infrastructure_nodes.get(name).cloned()
    }

    /// A capability's `requires` list, used by plan validation (§4.7 step
    /// 3 "requires of each capability must be satisfiable from inputs").
    pub fn requires_of(&self, capability: &str) -> Vec<String> {
        self.capabilities
            .get(capability)
            .map(|c| c.requires().to_vec())
            .unwrap_or_default()
    }

    pub fn export(&self) -> serde_json::Value {
        json!({
            "capabilities": self.capabilities.keys().collect::<Vec<_>>(),
            "infrastructure_nodes": self.infrastructure_nodes.keys().collect::<Vec<_>>(),
            "context_classes": self.context_classes.keys().collect::<Vec<_>>(),
            "data_sources": self.data_sources.iter().collect::<Vec<_>>(),
            "services": self.services.iter().collect::<Vec<_>>(),
        })
    }
}
