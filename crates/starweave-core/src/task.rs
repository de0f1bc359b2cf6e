//! Task types: a single schedulable unit of work in a constellation.

use crate::{DeviceId, Priority, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A Task represents one unit of work inside a constellation.
///
/// The planner creates tasks (at graph creation or during an edit); once
/// dispatched, only the scheduler mutates status/result/error. Tasks are
/// never deleted, only marked terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,

    /// Human-readable description of the work, handed to the device.
    pub description: String,

    /// Scheduling priority.
    pub priority: Priority,

    /// Current task status.
    pub status: TaskStatus,

    /// Explicit execution timeout. When `None`, the scheduler derives one
    /// from the priority; an explicitly set timeout is never overwritten.
    pub timeout: Option<Duration>,

    /// Result payload reported by the device on success.
    pub result: Option<serde_json::Value>,

    /// Error detail recorded on failure.
    pub error: Option<String>,

    /// Device the task was dispatched to, if any.
    pub device: Option<DeviceId>,

    /// When the task was created.
    pub created_at: DateTime<Utc>,

    /// When the task started executing.
    pub started_at: Option<DateTime<Utc>>,

    /// When the task reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending Task.
    pub fn new(id: impl Into<TaskId>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            priority: Priority::default(),
            status: TaskStatus::Pending,
            timeout: None,
            result: None,
            error: None,
            device: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Builder method to set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Builder method to set an explicit timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Effective timeout: the explicit one, else the priority-derived default.
    pub fn effective_timeout(&self, default: Duration, critical: Duration) -> Duration {
        match self.timeout {
            Some(t) => t,
            None if self.priority == Priority::High => critical,
            None => default,
        }
    }

    /// Mark the task as running, recording the device when already known.
    ///
    /// When the pool assigns a device only at dispatch time, the assignment
    /// is recorded later from the dispatch outcome instead.
    pub fn start(&mut self, device: Option<DeviceId>) {
        self.status = TaskStatus::Running;
        if device.is_some() {
            self.device = device;
        }
        self.started_at = Some(Utc::now());
    }

    /// Mark the task as completed with an optional result payload.
    pub fn complete(&mut self, result: Option<serde_json::Value>) {
        self.status = TaskStatus::Completed;
        self.result = result;
        self.finished_at = Some(Utc::now());
    }

    /// Mark the task as failed with an error detail.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }

    /// Mark the task as cancelled.
    pub fn cancel(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.finished_at = Some(Utc::now());
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_task_is_pending() {
        let task = Task::new("t1", "open settings");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.timeout.is_none());
        assert!(!task.is_terminal());
    }

    #[test]
    fn test_effective_timeout_prefers_explicit() {
        let default = Duration::from_secs(60);
        let critical = Duration::from_secs(180);

        let explicit = Task::new("t1", "x").with_timeout(Duration::from_secs(5));
        assert_eq!(
            explicit.effective_timeout(default, critical),
            Duration::from_secs(5)
        );

        let high = Task::new("t2", "x").with_priority(Priority::High);
        assert_eq!(high.effective_timeout(default, critical), critical);

        let medium = Task::new("t3", "x");
        assert_eq!(medium.effective_timeout(default, critical), default);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut task = Task::new("t1", "tap the button");
        task.start(Some(DeviceId::new("d1")));
        assert_eq!(task.status, TaskStatus::Running);
        assert!(task.started_at.is_some());

        task.complete(Some(json!({"ok": true})));
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.finished_at.is_some());
        assert_eq!(task.result, Some(json!({"ok": true})));
    }

    #[test]
    fn test_fail_records_error() {
        let mut task = Task::new("t1", "x");
        task.start(Some(DeviceId::new("d1")));
        task.fail("device unreachable");
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("device unreachable"));
    }
}
