//! Planner agent state machine.
//!
//! Sequences one orchestration session: create the constellation, hand it to
//! the scheduler, monitor completions, ask the external editor to revise the
//! graph, and decide when the session is done. The machine is
//! single-threaded per graph: no two editing passes ever overlap.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use starweave_core::{
    BusEvent, ChangeKind, Constellation, ConstellationStatus, GraphChange, Statistics,
    TaskCompletion, TaskId,
};

use crate::bus::{EventBus, EventObserver};
use crate::config::OrchestratorConfig;
use crate::planner::{ConstellationPlanner, PlanningContext};
use crate::policy::Verdict;
use crate::scheduler::{ExecutionHandle, Scheduler};
use crate::sync::ModificationSynchronizer;

/// Upper bound on how many queued completions one editing pass absorbs.
/// At least one is always taken; the bound keeps a fast producer from
/// starving the pass.
const MAX_MONITOR_BATCH: usize = 32;

/// States of the planner agent. `Finish` and `Fail` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// Create the constellation (or restart scheduling after an expansion).
    Start,
    /// Wait for completions, then run one editing pass.
    Monitor,
    /// The session ended with the graph satisfied.
    Finish,
    /// The session ended on a structural or planning failure, or the
    /// failure threshold was exceeded.
    Fail,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// The graph was satisfied.
    Finished,
    /// Planning failed, validation failed, or too many tasks failed.
    Failed,
    /// The constellation was cancelled externally.
    Cancelled,
}

/// Final report of one orchestration session.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// How the session ended.
    pub status: SessionStatus,

    /// Final snapshot of the constellation, when one was created.
    pub constellation: Option<Constellation>,

    /// Final task counts, when a constellation was created.
    pub statistics: Option<Statistics>,
}

/// What woke the monitor.
enum Wake {
    Completion(TaskCompletion),
    SchedulerDone,
}

/// The planner agent: one instance per session.
pub struct PlannerAgent {
    config: OrchestratorConfig,
    scheduler: Arc<Scheduler>,
    bus: Arc<EventBus>,
    synchronizer: Option<Arc<ModificationSynchronizer>>,
    planner: Arc<dyn ConstellationPlanner>,
    request: String,

    state: AgentState,
    round: u32,
    graph: Option<Arc<RwLock<Constellation>>>,
    handle: Option<ExecutionHandle>,
    completion_tx: mpsc::Sender<TaskCompletion>,
    completion_rx: mpsc::Receiver<TaskCompletion>,
}

impl PlannerAgent {
    /// Create an agent for one user request.
    pub fn new(
        config: OrchestratorConfig,
        scheduler: Arc<Scheduler>,
        bus: Arc<EventBus>,
        synchronizer: Option<Arc<ModificationSynchronizer>>,
        planner: Arc<dyn ConstellationPlanner>,
        request: impl Into<String>,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::channel(256);
        Self {
            config,
            scheduler,
            bus,
            synchronizer,
            planner,
            request: request.into(),
            state: AgentState::Start,
            round: 0,
            graph: None,
            handle: None,
            completion_tx,
            completion_rx,
        }
    }

    /// Drive the session to a terminal state.
    pub async fn run(mut self) -> SessionOutcome {
        if let Some(sync) = &self.synchronizer {
            self.bus
                .subscribe(Arc::clone(sync) as Arc<dyn EventObserver>)
                .await;
        }

        loop {
            match self.state {
                AgentState::Start => self.handle_start().await,
                AgentState::Monitor => self.handle_monitor().await,
                AgentState::Finish | AgentState::Fail => break,
            }
        }

        self.finalize().await
    }

    fn planning_context(&self) -> PlanningContext {
        PlanningContext {
            devices: self.scheduler.devices(),
            round: self.round,
        }
    }

    /// Create the constellation if none exists, then start a scheduling pass.
    async fn handle_start(&mut self) {
        if self.graph.is_none() {
            let ctx = self.planning_context();
            let constellation = match self.planner.create(&self.request, &ctx).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "Planner failed to produce a constellation");
                    self.state = AgentState::Fail;
                    return;
                }
            };

            let report = constellation.validate();
            if !report.is_valid {
                warn!(
                    violations = ?report.violations,
                    "Planner produced an invalid constellation"
                );
                self.state = AgentState::Fail;
                return;
            }

            info!(
                constellation_id = %constellation.id,
                tasks = constellation.task_count(),
                "Constellation created"
            );
            self.bus
                .publish(BusEvent::Graph(GraphChange::new(
                    ChangeKind::Created,
                    None,
                    constellation.clone(),
                )))
                .await;
            self.graph = Some(Arc::new(RwLock::new(constellation)));
        } else if let Some(graph) = &self.graph {
            // Expansion after completion: the same constellation goes back
            // to work under a fresh scheduling pass.
            graph.write().await.reopen();
        }

        let Some(graph) = &self.graph else {
            self.state = AgentState::Fail;
            return;
        };

        let handle = self
            .scheduler
            .execute(Arc::clone(graph), self.completion_tx.clone())
            .await;
        self.handle = Some(handle);
        self.state = AgentState::Monitor;
    }

    /// Block for at least one completion, drain a batch, and run one editing
    /// pass over it.
    async fn handle_monitor(&mut self) {
        let Some(graph) = self.graph.as_ref().map(Arc::clone) else {
            self.state = AgentState::Fail;
            return;
        };

        // The one true suspension point: wait for a completion, or for the
        // scheduling pass to end without producing one.
        let wake = {
            let rx = &mut self.completion_rx;
            let handle = self.handle.as_ref();
            let pass_done = async move {
                match handle {
                    Some(h) => h.wait_finished().await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                // Completions queued behind a finished pass still get
                // processed before the pass's end is acted on.
                biased;
                maybe = rx.recv() => match maybe {
                    Some(completion) => Wake::Completion(completion),
                    None => Wake::SchedulerDone,
                },
                _ = pass_done => Wake::SchedulerDone,
            }
        };

        let mut batch = Vec::new();
        if let Wake::Completion(completion) = wake {
            batch.push(completion);
        }
        while batch.len() < MAX_MONITOR_BATCH {
            match self.completion_rx.try_recv() {
                Ok(completion) => batch.push(completion),
                Err(_) => break,
            }
        }

        let Some(latest) = batch.last() else {
            self.resolve_idle_pass(&graph).await;
            return;
        };

        let completed_ids: Vec<TaskId> = batch.iter().map(|c| c.task_id.clone()).collect();
        debug!(batch = batch.len(), "Editing pass over completion batch");

        // Merge the (possibly stale) scheduler snapshot with observed
        // structural edits; degrade to the raw snapshot without a
        // synchronizer.
        let snapshot = latest.constellation.clone();
        let merged = match &self.synchronizer {
            Some(sync) => sync.merge_and_sync(snapshot).await,
            None => snapshot,
        };

        let ctx = self.planning_context();
        self.round += 1;
        let revision = match self.planner.revise(merged, &completed_ids, &ctx).await {
            Ok(revision) => revision,
            Err(e) => {
                warn!(error = %e, "Editor failed; failing the session");
                self.state = AgentState::Fail;
                return;
            }
        };

        let report = revision.constellation.validate();
        if !report.is_valid {
            warn!(
                violations = ?report.violations,
                "Editor produced an invalid constellation"
            );
            self.state = AgentState::Fail;
            return;
        }

        self.apply_revision(&graph, revision.constellation).await;

        match revision.decision {
            Verdict::Fail => {
                info!("Editor decided to fail the session");
                self.state = AgentState::Fail;
                return;
            }
            Verdict::Finish => {
                info!("Editor decided the session is finished");
                self.state = AgentState::Finish;
                return;
            }
            Verdict::Continue => {
                let pass_finished = self
                    .handle
                    .as_ref()
                    .map(|h| h.is_finished())
                    .unwrap_or(true);
                if pass_finished {
                    // Expansion after completion: a fresh pass must pick up
                    // the newly added work.
                    info!("Scheduling pass already finished; restarting");
                    self.state = AgentState::Start;
                } else {
                    self.state = AgentState::Monitor;
                }
            }
        }

        if self.round >= self.config.max_rounds {
            let stats = graph.read().await.statistics();
            let verdict = self.config.completion.decide(&stats);
            warn!(round = self.round, verdict = ?verdict, "Planner round limit reached");
            self.state = match verdict {
                Verdict::Finish => AgentState::Finish,
                Verdict::Continue | Verdict::Fail => AgentState::Fail,
            };
            return;
        }

        // Bound CPU between passes without adding material latency.
        tokio::task::yield_now().await;
    }

    /// The pass ended without a pending completion: restart if unscheduled
    /// ready work exists (an edit landed after the pass's completion check),
    /// otherwise settle the session from the graph's final state.
    async fn resolve_idle_pass(&mut self, graph: &Arc<RwLock<Constellation>>) {
        let (status, has_ready, stats) = {
            let g = graph.read().await;
            (g.status, !g.ready_tasks().is_empty(), g.statistics())
        };

        if status == ConstellationStatus::Cancelled {
            info!("Constellation was cancelled; ending session");
            self.state = AgentState::Fail;
            return;
        }

        if has_ready {
            info!("Ready work remains after pass ended; restarting");
            self.state = AgentState::Start;
            return;
        }

        let verdict = self.config.completion.decide(&stats);
        debug!(verdict = ?verdict, "Settling idle session from policy verdict");
        self.state = match verdict {
            Verdict::Fail => AgentState::Fail,
            // A pass that ran out of work with tolerable failures is done.
            Verdict::Finish | Verdict::Continue => AgentState::Finish,
        };
    }

    /// Copy the revision's structure into the shared graph without
    /// clobbering scheduler-side status advances, then wake the scheduler.
    async fn apply_revision(&self, graph: &Arc<RwLock<Constellation>>, revised: Constellation) {
        let (old, new) = {
            let mut g = graph.write().await;
            let old = g.clone();

            for task in revised.tasks() {
                if g.get_task(&task.id).is_none() {
                    if let Err(e) = g.add_task(task.clone()) {
                        warn!(task_id = %task.id, error = %e, "Could not add task from revision");
                    }
                } else if let Some(existing) = g.get_task_mut(&task.id) {
                    // Only the scheduler advances status; keep its view
                    // unless the revision is somehow fresher.
                    if task.status.rank() > existing.status.rank() {
                        *existing = task.clone();
                    }
                }
            }
            for dep in revised.dependencies() {
                if let Err(e) = g.add_dependency(dep.clone()) {
                    warn!(error = %e, "Could not add dependency from revision");
                }
            }

            g.reopen();
            (old, g.clone())
        };

        self.bus
            .publish(BusEvent::Graph(GraphChange::new(
                ChangeKind::Revised,
                Some(old),
                new,
            )))
            .await;

        if let Some(handle) = &self.handle {
            handle.notify_graph_changed();
        }
    }

    /// Tear down the background pass and report the outcome.
    async fn finalize(mut self) -> SessionOutcome {
        if let Some(handle) = self.handle.take() {
            handle.cancel().await;
        }

        let (constellation, statistics) = match &self.graph {
            Some(graph) => {
                let g = graph.read().await;
                (Some(g.clone()), Some(g.statistics()))
            }
            None => (None, None),
        };

        let status = match (&constellation, self.state) {
            (Some(c), _) if c.status == ConstellationStatus::Cancelled
                && self.state != AgentState::Finish =>
            {
                SessionStatus::Cancelled
            }
            (_, AgentState::Finish) => SessionStatus::Finished,
            _ => SessionStatus::Failed,
        };

        info!(status = ?status, "Session ended");
        SessionOutcome {
            status,
            constellation,
            statistics,
        }
    }
}
