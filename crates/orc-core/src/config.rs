//! Tunables for the router's bounded retry/replan/reclassify loop and for
//! the graph driver's safety limits.
//!
//! Resolution order (mirrored by the CLI collaborator, not by this crate):
//! CLI flag > environment variable > on-disk config file > the defaults
//! below.

use std::time::Duration;

/// Orchestration-wide limits and default policies.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum number of times the orchestrator may be invoked in a single
    /// turn before a REPLANNING error escalates to `error` (router §2e).
    pub max_planning_attempts: u32,
    /// Maximum number of times the classifier may be re-entered via
    /// RECLASSIFICATION in a single turn (router §2f).
    pub max_reclassifications: u32,
    /// Default [`crate::capability::RetryPolicy`] applied when a capability
    /// does not declare its own.
    ///
    /// The source documents `max_step_retries` as both `3` and `0` across
    /// different configuration samples; this implementation picks `3`
    /// (see DESIGN.md).
    pub default_max_attempts: u32,
    pub default_base_delay_seconds: f64,
    pub default_backoff_factor: f64,
    /// Hard upper bound on total node invocations per turn (§5).
    pub graph_recursion_limit: u32,
    /// Hard wall-clock limit for a single turn, measured from turn start.
    pub max_execution_time: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_planning_attempts: 2,
            max_reclassifications: 1,
            default_max_attempts: 3,
            default_base_delay_seconds: 1.0,
            default_backoff_factor: 1.5,
            graph_recursion_limit: 100,
            max_execution_time: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.max_planning_attempts, 2);
        assert_eq!(cfg.max_reclassifications, 1);
        assert_eq!(cfg.default_max_attempts, 3);
        assert_eq!(cfg.graph_recursion_limit, 100);
        assert_eq!(cfg.max_execution_time, Duration::from_secs(300));
    }
}
