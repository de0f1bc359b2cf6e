//! Dispatch interface: how the scheduler hands a task's work to a device.
//!
//! The orchestrator consumes this contract, it never implements it. A
//! timeout or transport failure must surface as a structured failure so the
//! scheduler can mark the task failed and continue.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use starweave_core::{DeviceId, DeviceInfo, Priority, TaskId};

/// Dispatch errors. The scheduler converts these into task failures; they
/// never abort the graph.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No device was available to take the task.
    #[error("No device available for task {0}")]
    NoDeviceAvailable(TaskId),

    /// Transport-level failure talking to the device.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The device rejected the request outright.
    #[error("Device rejected request: {0}")]
    Rejected(String),
}

/// A request to perform one task's work, keyed by the task id as
/// correlation id.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Correlation id: the task being executed.
    pub task_id: TaskId,

    /// What the device should do.
    pub description: String,

    /// Scheduling priority, for device-side queueing hints.
    pub priority: Priority,

    /// Per-call timeout the scheduler also enforces on its side.
    pub timeout: Duration,

    /// Preferred device, when the planner pinned one.
    pub device: Option<DeviceId>,
}

/// Structured result of one dispatch call.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The device finished the work successfully.
    Completed {
        /// Result payload reported by the device.
        payload: Option<serde_json::Value>,
        /// Device that performed the work.
        device: DeviceId,
    },
    /// The device reported a failure.
    Failed {
        /// Error detail.
        error: String,
        /// Device that attempted the work, if one was assigned.
        device: Option<DeviceId>,
    },
}

/// The device pool the scheduler dispatches into.
#[async_trait]
pub trait DeviceDispatcher: Send + Sync {
    /// Perform one task's work. Implementations must translate their own
    /// timeouts and transport failures into `Err(DispatchError)` or
    /// `DispatchOutcome::Failed`, never panic or hang indefinitely.
    async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome, DispatchError>;

    /// Devices currently in the pool, surfaced to the planner as context.
    fn devices(&self) -> Vec<DeviceInfo>;
}
