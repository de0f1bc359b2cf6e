//! The external planner/editor seam.
//!
//! The orchestrator treats the planner as an opaque, potentially slow,
//! fallible collaborator: it produces a constellation from the user request
//! and revises it in reaction to batches of completed work. Prompting and
//! response parsing live behind this trait, outside the engine.

use async_trait::async_trait;
use thiserror::Error;

use starweave_core::{Constellation, DeviceInfo, TaskId};

use crate::policy::Verdict;

/// Planner/editor errors. These are recovered at the state-machine level by
/// transitioning to the failed state, never by crashing the session.
#[derive(Debug, Error)]
pub enum PlanningError {
    /// The backing model or service failed.
    #[error("Planner backend failure: {0}")]
    Backend(String),

    /// The planner returned output that could not be turned into a graph.
    #[error("Malformed plan: {0}")]
    MalformedPlan(String),

    /// The planner produced no plan for the request.
    #[error("No plan produced for request")]
    Empty,
}

/// Context handed to the planner on every call.
#[derive(Debug, Clone)]
pub struct PlanningContext {
    /// Devices currently available for dispatch.
    pub devices: Vec<DeviceInfo>,

    /// Editing round within the session (0 for creation).
    pub round: u32,
}

/// Result of one editing pass: the edited graph plus the editor's
/// continuation choice.
#[derive(Debug, Clone)]
pub struct Revision {
    /// The revised constellation.
    pub constellation: Constellation,

    /// Whether the editor wants to continue, finish, or fail the session.
    pub decision: Verdict,
}

/// External planner/editor collaborator.
#[async_trait]
pub trait ConstellationPlanner: Send + Sync {
    /// Produce a constellation from the user request (creation pass).
    async fn create(
        &self,
        request: &str,
        ctx: &PlanningContext,
    ) -> Result<Constellation, PlanningError>;

    /// Revise an existing constellation given a batch of completed task ids
    /// (editing pass).
    async fn revise(
        &self,
        current: Constellation,
        completed: &[TaskId],
        ctx: &PlanningContext,
    ) -> Result<Revision, PlanningError>;
}
