//! Core domain errors.

use crate::TaskId;
use thiserror::Error;

/// Core domain errors for Starweave.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Task not found in the constellation.
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// A task with this id already exists.
    #[error("Duplicate task id: {0}")]
    DuplicateTask(TaskId),

    /// A dependency edge references a task that is not in the constellation.
    #[error("Dependency {from} -> {to} references missing task '{missing}'")]
    MissingEndpoint {
        from: TaskId,
        to: TaskId,
        missing: TaskId,
    },

    /// The constellation failed structural validation.
    #[error("Invalid constellation: {}", violations.join("; "))]
    InvalidConstellation { violations: Vec<String> },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}
