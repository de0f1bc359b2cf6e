//! Status and priority enums for tasks and constellations.

use serde::{Deserialize, Serialize};

/// Priority of a Task.
///
/// The ordering is semantic: `Low < Medium < High`. High-priority tasks get
/// the longer "critical" timeout when none is set explicitly.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Background work; scheduled like any other but with the default timeout.
    Low,
    /// Normal work.
    #[default]
    Medium,
    /// Critical-path work; receives the extended timeout by default.
    High,
}

/// Status of a Task within a constellation.
///
/// Transitions are strictly forward-moving in place:
/// `Pending -> Running -> {Completed, Failed, Cancelled}`. A task never moves
/// backward; re-planning creates a new task under a new id instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Task created but not yet dispatched.
    #[default]
    Pending,
    /// Task dispatched to a device and executing.
    Running,
    /// Task completed successfully.
    Completed,
    /// Task failed (dispatch error, device error, or timeout).
    Failed,
    /// Task was cancelled before reaching a natural terminal state.
    Cancelled,
}

impl TaskStatus {
    /// Returns true if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if the task is still active (not terminal).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Advancement rank used when reconciling concurrent views of a task.
    ///
    /// Only the scheduler advances status and it never regresses, so the
    /// higher rank is always the fresher write:
    /// `Pending < Running < {Completed, Failed, Cancelled}`.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Completed | Self::Failed | Self::Cancelled => 2,
        }
    }
}

/// Overall status of a Constellation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstellationStatus {
    /// Created but not yet handed to a scheduler.
    #[default]
    Pending,
    /// A scheduler pass is active.
    Running,
    /// Every task is terminal and no task is ready. A completed
    /// constellation may be reopened by a structural edit.
    Completed,
    /// The failure threshold was exceeded or planning failed.
    Failed,
    /// The session was cancelled externally.
    Cancelled,
}

impl ConstellationStatus {
    /// Returns true if the constellation is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}
