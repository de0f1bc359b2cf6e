//! Orchestrator configuration.

use std::time::Duration;

use crate::policy::CompletionPolicy;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum tasks dispatched concurrently per constellation.
    pub max_concurrent_tasks: usize,

    /// Timeout for tasks without an explicit one.
    pub default_task_timeout: Duration,

    /// Timeout for high-priority tasks without an explicit one.
    pub critical_task_timeout: Duration,

    /// How long cancellation waits for in-flight tasks to acknowledge
    /// before proceeding with cleanup.
    pub cancel_grace: Duration,

    /// Maximum planner editing rounds per session.
    pub max_rounds: u32,

    /// Thresholds for the completion decision.
    pub completion: CompletionPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 4,
            default_task_timeout: Duration::from_secs(60),
            critical_task_timeout: Duration::from_secs(180),
            cancel_grace: Duration::from_secs(5),
            max_rounds: 16,
            completion: CompletionPolicy::default(),
        }
    }
}
