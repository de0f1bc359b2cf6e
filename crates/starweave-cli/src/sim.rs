//! Scripted planner and simulated device pool for local sessions.
//!
//! The simulator stands in for the real LLM planner and device automation:
//! the planner weaves a linear constellation out of the request's steps, and
//! each dispatch sleeps briefly before succeeding.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use starweave_core::{Constellation, Dependency, DeviceId, DeviceInfo, Task, TaskId};
use starweave_orchestrator::{
    ConstellationPlanner, DeviceDispatcher, DispatchError, DispatchOutcome, DispatchRequest,
    PlanningContext, PlanningError, Revision, Verdict,
};

/// Planner that turns a `;`-separated request into a sequential
/// constellation, and finishes once every task has completed.
pub struct ScriptedPlanner;

#[async_trait]
impl ConstellationPlanner for ScriptedPlanner {
    async fn create(
        &self,
        request: &str,
        ctx: &PlanningContext,
    ) -> Result<Constellation, PlanningError> {
        let steps: Vec<&str> = request
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if steps.is_empty() {
            return Err(PlanningError::Empty);
        }

        info!(
            steps = steps.len(),
            devices = ctx.devices.len(),
            "Weaving constellation from request"
        );

        let mut constellation = Constellation::new(request);
        for (i, step) in steps.iter().enumerate() {
            constellation
                .add_task(Task::new(format!("step-{}", i + 1), *step))
                .map_err(|e| PlanningError::MalformedPlan(e.to_string()))?;
        }
        for i in 1..steps.len() {
            constellation
                .add_dependency(Dependency::new(
                    format!("step-{i}"),
                    format!("step-{}", i + 1),
                ))
                .map_err(|e| PlanningError::MalformedPlan(e.to_string()))?;
        }
        Ok(constellation)
    }

    async fn revise(
        &self,
        current: Constellation,
        completed: &[TaskId],
        _ctx: &PlanningContext,
    ) -> Result<Revision, PlanningError> {
        let stats = current.statistics();
        info!(
            batch = completed.len(),
            completed = stats.completed,
            total = stats.total,
            "Reviewing completion batch"
        );

        let decision = if stats.completed == stats.total {
            Verdict::Finish
        } else if stats.failed > 0 {
            Verdict::Fail
        } else {
            Verdict::Continue
        };
        Ok(Revision {
            constellation: current,
            decision,
        })
    }
}

/// Device pool that sleeps for a fixed delay, then reports success.
pub struct SimulatedDispatcher {
    devices: Vec<DeviceInfo>,
    delay: Duration,
    next: AtomicUsize,
}

impl SimulatedDispatcher {
    /// Create a pool of `count` simulated devices.
    pub fn new(count: usize, delay: Duration) -> Self {
        let devices = (0..count)
            .map(|i| {
                DeviceInfo::new(DeviceId::new(format!("sim-{i}")), format!("simulator {i}"))
                    .with_label("kind", "simulated")
            })
            .collect();
        Self {
            devices,
            delay,
            next: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DeviceDispatcher for SimulatedDispatcher {
    async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome, DispatchError> {
        if self.devices.is_empty() {
            return Err(DispatchError::NoDeviceAvailable(request.task_id));
        }
        let slot = self.next.fetch_add(1, Ordering::SeqCst) % self.devices.len();
        let device = self.devices[slot].device_id.clone();

        info!(
            task_id = %request.task_id,
            device = %device,
            "Simulating task execution"
        );
        tokio::time::sleep(self.delay).await;

        Ok(DispatchOutcome::Completed {
            payload: Some(json!({
                "performed": request.description,
                "device": device.as_str(),
            })),
            device,
        })
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        self.devices.clone()
    }
}
