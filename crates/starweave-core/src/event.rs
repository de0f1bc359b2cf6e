//! Event payloads exchanged over the session event bus.

use crate::{Constellation, ConstellationId, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};

/// Outcome of a single task, published when it reaches a terminal status.
///
/// Carries a snapshot of the constellation as the scheduler saw it at
/// publication time; the snapshot may be stale relative to planner edits
/// that landed concurrently, which is what the synchronizer reconciles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCompletion {
    /// The task that finished.
    pub task_id: TaskId,

    /// Terminal status the task reached.
    pub status: TaskStatus,

    /// Result payload, when the task completed.
    pub result: Option<serde_json::Value>,

    /// Error detail, when the task failed.
    pub error: Option<String>,

    /// Snapshot of the constellation at publication time.
    pub constellation: Constellation,
}

impl TaskCompletion {
    /// Build a completion notification from a task inside a snapshot.
    ///
    /// Returns `None` when the task is not present in the snapshot.
    pub fn from_snapshot(task_id: &TaskId, snapshot: Constellation) -> Option<Self> {
        let task = snapshot.get_task(task_id)?;
        Some(Self {
            task_id: task_id.clone(),
            status: task.status,
            result: task.result.clone(),
            error: task.error.clone(),
            constellation: snapshot,
        })
    }
}

/// Kind of structural or lifecycle change to a constellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// The constellation was created by the planner.
    Created,
    /// The planner landed a structural edit.
    Revised,
    /// A scheduler pass finished the current graph shape.
    Completed,
    /// The constellation was cancelled.
    Cancelled,
}

/// A constellation-level change notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphChange {
    /// The constellation this change concerns.
    pub constellation_id: ConstellationId,

    /// What kind of change happened.
    pub kind: ChangeKind,

    /// The graph before the change, when one existed.
    pub old: Option<Constellation>,

    /// The graph after the change.
    pub new: Constellation,
}

impl GraphChange {
    /// Create a change notification.
    pub fn new(kind: ChangeKind, old: Option<Constellation>, new: Constellation) -> Self {
        Self {
            constellation_id: new.id.clone(),
            kind,
            old,
            new,
        }
    }
}

/// Union of everything the event bus delivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BusEvent {
    /// A task reached a terminal status.
    Task(TaskCompletion),
    /// A constellation was created, revised, completed, or cancelled.
    Graph(GraphChange),
}
