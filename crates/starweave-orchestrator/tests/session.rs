//! End-to-end session tests: the planner state machine, scheduler, bus and
//! synchronizer wired together against in-process collaborators.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::timeout;

use starweave_core::{
    Constellation, ConstellationStatus, Dependency, DeviceId, DeviceInfo, Task, TaskId, TaskStatus,
};
use starweave_orchestrator::{
    CompletionPolicy, ConstellationPlanner, DeviceDispatcher, DispatchError, DispatchOutcome,
    DispatchRequest, EventBus, ModificationSynchronizer, OrchestratorConfig, PlannerAgent,
    PlanningContext, PlanningError, Revision, Scheduler, SessionStatus, Verdict,
};

const SESSION_DEADLINE: Duration = Duration::from_secs(10);

/// Dispatcher that succeeds after a short sleep, except for tasks whose
/// description contains "fail".
struct ScriptedDispatcher {
    delay: Duration,
}

impl ScriptedDispatcher {
    fn quick() -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::from_millis(5),
        })
    }
}

#[async_trait]
impl DeviceDispatcher for ScriptedDispatcher {
    async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome, DispatchError> {
        tokio::time::sleep(self.delay).await;
        if request.description.contains("fail") {
            Ok(DispatchOutcome::Failed {
                error: "scripted device failure".to_string(),
                device: Some(DeviceId::new("sim-0")),
            })
        } else {
            Ok(DispatchOutcome::Completed {
                payload: Some(json!({ "performed": request.description })),
                device: DeviceId::new("sim-0"),
            })
        }
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        vec![DeviceInfo::new(DeviceId::new("sim-0"), "simulator")]
    }
}

fn agent_for(
    planner: Arc<dyn ConstellationPlanner>,
    dispatcher: Arc<dyn DeviceDispatcher>,
    config: OrchestratorConfig,
    with_synchronizer: bool,
) -> PlannerAgent {
    let bus = Arc::new(EventBus::new());
    let scheduler = Arc::new(Scheduler::new(config.clone(), Arc::clone(&bus), dispatcher));
    let synchronizer = if with_synchronizer {
        Some(Arc::new(ModificationSynchronizer::new()))
    } else {
        None
    };
    PlannerAgent::new(config, scheduler, bus, synchronizer, planner, "test session")
}

/// Creates a linear chain of `n` tasks; finishes once all have completed.
struct LinearPlanner {
    n: usize,
}

#[async_trait]
impl ConstellationPlanner for LinearPlanner {
    async fn create(
        &self,
        request: &str,
        _ctx: &PlanningContext,
    ) -> Result<Constellation, PlanningError> {
        let mut c = Constellation::new(request);
        for i in 1..=self.n {
            c.add_task(Task::new(format!("step-{i}"), format!("Task {i}")))
                .map_err(|e| PlanningError::MalformedPlan(e.to_string()))?;
        }
        for i in 1..self.n {
            c.add_dependency(Dependency::new(format!("step-{i}"), format!("step-{}", i + 1)))
                .map_err(|e| PlanningError::MalformedPlan(e.to_string()))?;
        }
        Ok(c)
    }

    async fn revise(
        &self,
        current: Constellation,
        _completed: &[TaskId],
        _ctx: &PlanningContext,
    ) -> Result<Revision, PlanningError> {
        let stats = current.statistics();
        let decision = if stats.completed == stats.total {
            Verdict::Finish
        } else {
            Verdict::Continue
        };
        Ok(Revision {
            constellation: current,
            decision,
        })
    }
}

#[tokio::test]
async fn test_linear_session_finishes() {
    let agent = agent_for(
        Arc::new(LinearPlanner { n: 3 }),
        ScriptedDispatcher::quick(),
        OrchestratorConfig::default(),
        true,
    );

    let outcome = timeout(SESSION_DEADLINE, agent.run())
        .await
        .expect("session should terminate");

    assert_eq!(outcome.status, SessionStatus::Finished);
    let c = outcome.constellation.expect("graph exists");
    assert_eq!(c.task_count(), 3);
    assert_eq!(c.dependency_count(), 2);
    assert_eq!(c.status, ConstellationStatus::Completed);
    assert!(c.tasks().all(|t| t.status == TaskStatus::Completed));

    let stats = outcome.statistics.expect("statistics exist");
    assert_eq!(stats.completed, 3);
}

#[tokio::test]
async fn test_session_without_synchronizer_degrades_gracefully() {
    let agent = agent_for(
        Arc::new(LinearPlanner { n: 2 }),
        ScriptedDispatcher::quick(),
        OrchestratorConfig::default(),
        false,
    );

    let outcome = timeout(SESSION_DEADLINE, agent.run())
        .await
        .expect("session should terminate");

    assert_eq!(outcome.status, SessionStatus::Finished);
    assert_eq!(outcome.statistics.unwrap().completed, 2);
}

/// Creates one task, then expands the constellation by two more tasks after
/// the first completes ("expansion after completion").
struct ExpandingPlanner;

#[async_trait]
impl ConstellationPlanner for ExpandingPlanner {
    async fn create(
        &self,
        request: &str,
        _ctx: &PlanningContext,
    ) -> Result<Constellation, PlanningError> {
        let mut c = Constellation::new(request);
        c.add_task(Task::new("step-1", "Task 1"))
            .map_err(|e| PlanningError::MalformedPlan(e.to_string()))?;
        Ok(c)
    }

    async fn revise(
        &self,
        current: Constellation,
        _completed: &[TaskId],
        _ctx: &PlanningContext,
    ) -> Result<Revision, PlanningError> {
        let mut edited = current;

        if edited.task_count() == 1 {
            edited
                .add_task(Task::new("step-2", "Task 2"))
                .map_err(|e| PlanningError::MalformedPlan(e.to_string()))?;
            edited
                .add_task(Task::new("step-3", "Task 3"))
                .map_err(|e| PlanningError::MalformedPlan(e.to_string()))?;
            edited
                .add_dependency(Dependency::new("step-1", "step-2"))
                .map_err(|e| PlanningError::MalformedPlan(e.to_string()))?;
            return Ok(Revision {
                constellation: edited,
                decision: Verdict::Continue,
            });
        }

        let stats = edited.statistics();
        let decision = if stats.completed == stats.total {
            Verdict::Finish
        } else {
            Verdict::Continue
        };
        Ok(Revision {
            constellation: edited,
            decision,
        })
    }
}

#[tokio::test]
async fn test_expansion_after_completion_resumes_scheduling() {
    let agent = agent_for(
        Arc::new(ExpandingPlanner),
        ScriptedDispatcher::quick(),
        OrchestratorConfig::default(),
        true,
    );

    let outcome = timeout(SESSION_DEADLINE, agent.run())
        .await
        .expect("session should terminate");

    assert_eq!(outcome.status, SessionStatus::Finished);
    let c = outcome.constellation.expect("graph exists");
    assert_eq!(c.task_count(), 3);
    assert_eq!(c.status, ConstellationStatus::Completed);
    assert!(c.tasks().all(|t| t.status == TaskStatus::Completed));
}

/// Ten independent tasks, four scripted to fail; decides from the policy
/// only once every task is terminal.
struct MixedOutcomePlanner;

#[async_trait]
impl ConstellationPlanner for MixedOutcomePlanner {
    async fn create(
        &self,
        request: &str,
        _ctx: &PlanningContext,
    ) -> Result<Constellation, PlanningError> {
        let mut c = Constellation::new(request);
        for i in 1..=10 {
            let description = if i <= 4 {
                format!("fail step {i}")
            } else {
                format!("step {i}")
            };
            c.add_task(Task::new(format!("step-{i}"), description))
                .map_err(|e| PlanningError::MalformedPlan(e.to_string()))?;
        }
        Ok(c)
    }

    async fn revise(
        &self,
        current: Constellation,
        _completed: &[TaskId],
        _ctx: &PlanningContext,
    ) -> Result<Revision, PlanningError> {
        let stats = current.statistics();
        let decision = if stats.terminal() < stats.total {
            Verdict::Continue
        } else {
            CompletionPolicy::default().decide(&stats)
        };
        Ok(Revision {
            constellation: current,
            decision,
        })
    }
}

#[tokio::test]
async fn test_failure_threshold_fails_session() {
    let config = OrchestratorConfig {
        max_concurrent_tasks: 10,
        ..OrchestratorConfig::default()
    };
    let agent = agent_for(
        Arc::new(MixedOutcomePlanner),
        ScriptedDispatcher::quick(),
        config,
        true,
    );

    let outcome = timeout(SESSION_DEADLINE, agent.run())
        .await
        .expect("session should terminate");

    // 6 completed, 4 failed: failures exceed 30% of completions.
    assert_eq!(outcome.status, SessionStatus::Failed);
    let stats = outcome.statistics.expect("statistics exist");
    assert_eq!(stats.failed, 4);
    assert_eq!(stats.completed, 6);
}

/// Planner whose creation pass emits a cyclic graph.
struct CyclicPlanner;

#[async_trait]
impl ConstellationPlanner for CyclicPlanner {
    async fn create(
        &self,
        request: &str,
        _ctx: &PlanningContext,
    ) -> Result<Constellation, PlanningError> {
        let mut c = Constellation::new(request);
        c.add_task(Task::new("a", "A"))
            .map_err(|e| PlanningError::MalformedPlan(e.to_string()))?;
        c.add_task(Task::new("b", "B"))
            .map_err(|e| PlanningError::MalformedPlan(e.to_string()))?;
        c.add_dependency(Dependency::new("a", "b"))
            .map_err(|e| PlanningError::MalformedPlan(e.to_string()))?;
        c.add_dependency(Dependency::new("b", "a"))
            .map_err(|e| PlanningError::MalformedPlan(e.to_string()))?;
        Ok(c)
    }

    async fn revise(
        &self,
        current: Constellation,
        _completed: &[TaskId],
        _ctx: &PlanningContext,
    ) -> Result<Revision, PlanningError> {
        Ok(Revision {
            constellation: current,
            decision: Verdict::Continue,
        })
    }
}

#[tokio::test]
async fn test_invalid_creation_fails_session() {
    let agent = agent_for(
        Arc::new(CyclicPlanner),
        ScriptedDispatcher::quick(),
        OrchestratorConfig::default(),
        true,
    );

    let outcome = timeout(SESSION_DEADLINE, agent.run())
        .await
        .expect("session should terminate");

    assert_eq!(outcome.status, SessionStatus::Failed);
    assert!(outcome.constellation.is_none());
}

/// Creates a valid graph, then returns a cyclic revision.
struct BadEditorPlanner;

#[async_trait]
impl ConstellationPlanner for BadEditorPlanner {
    async fn create(
        &self,
        request: &str,
        _ctx: &PlanningContext,
    ) -> Result<Constellation, PlanningError> {
        let mut c = Constellation::new(request);
        c.add_task(Task::new("a", "A"))
            .map_err(|e| PlanningError::MalformedPlan(e.to_string()))?;
        Ok(c)
    }

    async fn revise(
        &self,
        current: Constellation,
        _completed: &[TaskId],
        _ctx: &PlanningContext,
    ) -> Result<Revision, PlanningError> {
        let mut edited = current;
        edited
            .add_task(Task::new("b", "B"))
            .map_err(|e| PlanningError::MalformedPlan(e.to_string()))?;
        edited
            .add_dependency(Dependency::new("a", "b"))
            .map_err(|e| PlanningError::MalformedPlan(e.to_string()))?;
        edited
            .add_dependency(Dependency::new("b", "a"))
            .map_err(|e| PlanningError::MalformedPlan(e.to_string()))?;
        Ok(Revision {
            constellation: edited,
            decision: Verdict::Continue,
        })
    }
}

#[tokio::test]
async fn test_invalid_revision_fails_session() {
    let agent = agent_for(
        Arc::new(BadEditorPlanner),
        ScriptedDispatcher::quick(),
        OrchestratorConfig::default(),
        true,
    );

    let outcome = timeout(SESSION_DEADLINE, agent.run())
        .await
        .expect("session should terminate");

    assert_eq!(outcome.status, SessionStatus::Failed);
    // The shared graph never absorbed the invalid edit.
    let c = outcome.constellation.expect("graph exists");
    assert!(c.validate().is_valid);
}

/// Planner that cannot produce a graph at all.
struct BrokenPlanner;

#[async_trait]
impl ConstellationPlanner for BrokenPlanner {
    async fn create(
        &self,
        _request: &str,
        _ctx: &PlanningContext,
    ) -> Result<Constellation, PlanningError> {
        Err(PlanningError::Backend("model unavailable".to_string()))
    }

    async fn revise(
        &self,
        current: Constellation,
        _completed: &[TaskId],
        _ctx: &PlanningContext,
    ) -> Result<Revision, PlanningError> {
        Ok(Revision {
            constellation: current,
            decision: Verdict::Continue,
        })
    }
}

#[tokio::test]
async fn test_planner_failure_fails_session() {
    let agent = agent_for(
        Arc::new(BrokenPlanner),
        ScriptedDispatcher::quick(),
        OrchestratorConfig::default(),
        true,
    );

    let outcome = timeout(SESSION_DEADLINE, agent.run())
        .await
        .expect("session should terminate");

    assert_eq!(outcome.status, SessionStatus::Failed);
    assert!(outcome.constellation.is_none());
    assert!(outcome.statistics.is_none());
}
