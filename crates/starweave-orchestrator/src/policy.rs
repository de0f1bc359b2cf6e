//! Completion-decision policy.
//!
//! Shared by the planner agent's continuation choice and the scheduler's
//! final COMPLETED/FAILED decision. Guards against a graph that stalls in a
//! mixed partial-success state.

use serde::{Deserialize, Serialize};

use starweave_core::Statistics;

/// What the session should do next, given current statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Keep monitoring; not enough of the graph is decided yet.
    Continue,
    /// Enough tasks succeeded; the session can finish.
    Finish,
    /// Failures exceeded the tolerated ratio; the session should fail.
    Fail,
}

/// Threshold fractions for the completion decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompletionPolicy {
    /// Fraction of tasks that must be decided (completed + failed) before
    /// any verdict other than `Continue` is reached.
    pub coverage_threshold: f64,

    /// Maximum tolerated failures as a fraction of completions.
    pub max_failure_ratio: f64,

    /// Completions required, as a fraction of total tasks, to finish.
    pub finish_ratio: f64,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self {
            coverage_threshold: 0.8,
            max_failure_ratio: 0.3,
            finish_ratio: 0.9,
        }
    }
}

impl CompletionPolicy {
    /// Decide what the session should do given current task counts.
    pub fn decide(&self, stats: &Statistics) -> Verdict {
        if stats.total == 0 {
            return Verdict::Continue;
        }

        let decided = (stats.completed + stats.failed) as f64;
        if decided < self.coverage_threshold * stats.total as f64 {
            return Verdict::Continue;
        }

        if stats.failed as f64 > self.max_failure_ratio * stats.completed as f64 {
            return Verdict::Fail;
        }

        if stats.completed as f64 >= self.finish_ratio * stats.total as f64 {
            return Verdict::Finish;
        }

        Verdict::Continue
    }

    /// Whether a finished graph with the given counts is a failure overall.
    pub fn graph_failed(&self, stats: &Statistics) -> bool {
        stats.failed > 0 && self.decide(stats) == Verdict::Fail
    }
}
