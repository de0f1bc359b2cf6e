//! Ready-task scheduler: drives one constellation to completion or
//! cancellation.
//!
//! One cooperative loop runs per in-flight constellation. It computes the
//! ready set, dispatches up to the configured capacity, and re-evaluates
//! whenever an execution unit finishes or the planner lands an edit. The
//! scheduler is the sole writer of per-task status/result/error.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify, RwLock, Semaphore};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use starweave_core::{
    BusEvent, ChangeKind, Constellation, ConstellationId, ConstellationStatus, GraphChange,
    TaskCompletion, TaskId,
};

use crate::bus::EventBus;
use crate::config::OrchestratorConfig;
use crate::dispatch::{DeviceDispatcher, DispatchOutcome, DispatchRequest};

/// Handle to a detached scheduling pass.
///
/// The pass is never implicit: whoever starts it holds this handle and is
/// responsible for cancelling it on teardown.
pub struct ExecutionHandle {
    constellation_id: ConstellationId,
    cancel: CancellationToken,
    finished: CancellationToken,
    wake: Arc<Notify>,
    grace: Duration,
}

impl ExecutionHandle {
    /// The constellation this pass is executing.
    pub fn constellation_id(&self) -> &ConstellationId {
        &self.constellation_id
    }

    /// Wake the loop so it re-reads the ready set after a structural edit.
    pub fn notify_graph_changed(&self) {
        self.wake.notify_one();
    }

    /// True once the scheduling loop has exited.
    pub fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }

    /// Wait for the scheduling loop to exit.
    pub async fn wait_finished(&self) {
        self.finished.cancelled().await;
    }

    /// Cancel the pass and wait (bounded) for it to wind down.
    ///
    /// Idempotent: cancelling an already-finished pass is a no-op. If the
    /// loop does not acknowledge within the grace period plus slack, the
    /// caller proceeds anyway and the discrepancy is logged.
    pub async fn cancel(&self) {
        self.cancel.cancel();
        let bound = self.grace + Duration::from_secs(1);
        if timeout(bound, self.finished.cancelled()).await.is_err() {
            warn!(
                constellation_id = %self.constellation_id,
                "Scheduling pass did not acknowledge cancellation in time"
            );
        }
    }
}

/// Everything one scheduling pass needs, cloned into the background task.
struct RunContext {
    config: OrchestratorConfig,
    bus: Arc<EventBus>,
    dispatcher: Arc<dyn DeviceDispatcher>,
    graph: Arc<RwLock<Constellation>>,
    completions: mpsc::Sender<TaskCompletion>,
    cancel: CancellationToken,
    wake: Arc<Notify>,
}

/// Task scheduler.
pub struct Scheduler {
    config: OrchestratorConfig,
    bus: Arc<EventBus>,
    dispatcher: Arc<dyn DeviceDispatcher>,
}

impl Scheduler {
    /// Create a new Scheduler.
    pub fn new(
        config: OrchestratorConfig,
        bus: Arc<EventBus>,
        dispatcher: Arc<dyn DeviceDispatcher>,
    ) -> Self {
        Self {
            config,
            bus,
            dispatcher,
        }
    }

    /// Devices currently available in the dispatch pool.
    pub fn devices(&self) -> Vec<starweave_core::DeviceInfo> {
        self.dispatcher.devices()
    }

    /// Start a detached scheduling pass over the given constellation.
    ///
    /// Terminal task outcomes are delivered both to the event bus and
    /// directly to `completions` (the planner's channel). The returned
    /// handle is the only way to cancel or observe the pass.
    pub async fn execute(
        &self,
        graph: Arc<RwLock<Constellation>>,
        completions: mpsc::Sender<TaskCompletion>,
    ) -> ExecutionHandle {
        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();
        let wake = Arc::new(Notify::new());

        let constellation_id = graph.read().await.id.clone();

        let ctx = RunContext {
            config: self.config.clone(),
            bus: Arc::clone(&self.bus),
            dispatcher: Arc::clone(&self.dispatcher),
            graph,
            completions,
            cancel: cancel.clone(),
            wake: Arc::clone(&wake),
        };

        let loop_finished = finished.clone();
        tokio::spawn(async move {
            run_loop(ctx).await;
            loop_finished.cancel();
        });

        ExecutionHandle {
            constellation_id,
            cancel,
            finished,
            wake,
            grace: self.config.cancel_grace,
        }
    }
}

/// The cooperative scheduling loop for one pass.
async fn run_loop(ctx: RunContext) {
    let semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrent_tasks));
    let (done_tx, mut done_rx) = mpsc::channel::<TaskId>(64);
    let mut in_flight: usize = 0;

    {
        let mut graph = ctx.graph.write().await;
        graph.status = ConstellationStatus::Running;
        info!(
            constellation_id = %graph.id,
            tasks = graph.task_count(),
            "Starting scheduling pass"
        );
    }

    loop {
        in_flight += dispatch_ready(&ctx, &semaphore, &done_tx).await;

        let complete = ctx.graph.read().await.is_complete();
        if complete && in_flight == 0 {
            finalize(&ctx).await;
            break;
        }

        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                drain_in_flight(&ctx, &mut done_rx, in_flight).await;
                // A cancel that lands after the work already ran out settles
                // the pass normally instead of clobbering it as cancelled.
                if ctx.graph.read().await.is_complete() {
                    finalize(&ctx).await;
                } else {
                    cancel_sweep(&ctx).await;
                }
                break;
            }
            Some(task_id) = done_rx.recv() => {
                in_flight -= 1;
                debug!(task_id = %task_id, in_flight, "Execution unit finished");
            }
            _ = ctx.wake.notified() => {
                debug!("Woken for ready-set re-evaluation");
            }
        }
    }
}

/// Dispatch every ready task for which a capacity permit is available.
/// Ready tasks beyond capacity stay undispatched until a permit frees.
///
/// Returns the number of execution units spawned.
async fn dispatch_ready(
    ctx: &RunContext,
    semaphore: &Arc<Semaphore>,
    done_tx: &mpsc::Sender<TaskId>,
) -> usize {
    let mut spawned = 0;

    loop {
        let permit = match Arc::clone(semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let request = {
            let mut graph = ctx.graph.write().await;
            let next = graph.ready_tasks().first().map(|t| t.id.clone());
            let request = match next {
                None => None,
                Some(id) => graph.get_task(&id).map(|task| DispatchRequest {
                    task_id: id.clone(),
                    description: task.description.clone(),
                    priority: task.priority,
                    timeout: task.effective_timeout(
                        ctx.config.default_task_timeout,
                        ctx.config.critical_task_timeout,
                    ),
                    device: task.device.clone(),
                }),
            };
            if let Some(req) = &request {
                if let Err(e) = graph.mark_running(&req.task_id, req.device.clone()) {
                    warn!(task_id = %req.task_id, error = %e, "Failed to mark task running");
                }
            }
            request
        };

        let Some(request) = request else {
            drop(permit);
            break;
        };

        info!(
            task_id = %request.task_id,
            priority = ?request.priority,
            timeout = ?request.timeout,
            "Dispatching task"
        );
        spawned += 1;

        let graph = Arc::clone(&ctx.graph);
        let bus = Arc::clone(&ctx.bus);
        let dispatcher = Arc::clone(&ctx.dispatcher);
        let completions = ctx.completions.clone();
        let cancel = ctx.cancel.clone();
        let done_tx = done_tx.clone();

        tokio::spawn(async move {
            let task_id = request.task_id.clone();
            run_task(graph, bus, dispatcher, completions, cancel, request).await;
            // Free the capacity permit before waking the loop, so the freed
            // slot is visible to the next dispatch sweep.
            drop(permit);
            let _ = done_tx.send(task_id).await;
        });
    }

    spawned
}

/// One execution unit: dispatch with timeout, record the terminal status,
/// publish the completion.
async fn run_task(
    graph: Arc<RwLock<Constellation>>,
    bus: Arc<EventBus>,
    dispatcher: Arc<dyn DeviceDispatcher>,
    completions: mpsc::Sender<TaskCompletion>,
    cancel: CancellationToken,
    request: DispatchRequest,
) {
    let task_id = request.task_id.clone();
    let deadline = request.timeout;

    let outcome = tokio::select! {
        // On cancellation the sweep owns the status transition.
        _ = cancel.cancelled() => None,
        result = timeout(deadline, dispatcher.dispatch(request)) => Some(match result {
            Err(_) => DispatchOutcome::Failed {
                error: format!("task timed out after {:?}", deadline),
                device: None,
            },
            Ok(Err(e)) => DispatchOutcome::Failed {
                error: e.to_string(),
                device: None,
            },
            Ok(Ok(outcome)) => outcome,
        }),
    };

    if let Some(outcome) = outcome {
        let snapshot = {
            let mut graph = graph.write().await;
            match outcome {
                DispatchOutcome::Completed { payload, device } => {
                    if let Some(task) = graph.get_task_mut(&task_id) {
                        task.device = Some(device);
                        task.complete(payload);
                    }
                }
                DispatchOutcome::Failed { error, device } => {
                    if let Some(task) = graph.get_task_mut(&task_id) {
                        if device.is_some() {
                            task.device = device;
                        }
                        task.fail(error);
                    }
                }
            }
            graph.clone()
        };

        if let Some(completion) = TaskCompletion::from_snapshot(&task_id, snapshot) {
            info!(task_id = %task_id, status = ?completion.status, "Task finished");
            // Dual delivery: the bus for observers, the direct channel for
            // the planner.
            bus.publish(BusEvent::Task(completion.clone())).await;
            if completions.send(completion).await.is_err() {
                warn!(task_id = %task_id, "Completion channel closed");
            }
        }
    }
}

/// Wait (bounded by the grace period) for in-flight units to acknowledge
/// cancellation. If a unit does not acknowledge in time, cleanup proceeds
/// anyway and the discrepancy is logged.
async fn drain_in_flight(
    ctx: &RunContext,
    done_rx: &mut mpsc::Receiver<TaskId>,
    mut in_flight: usize,
) {
    info!(in_flight, "Cancellation requested; draining in-flight tasks");

    let deadline = tokio::time::Instant::now() + ctx.config.cancel_grace;
    while in_flight > 0 {
        match tokio::time::timeout_at(deadline, done_rx.recv()).await {
            Ok(Some(_)) => in_flight -= 1,
            Ok(None) => break,
            Err(_) => {
                warn!(
                    remaining = in_flight,
                    "In-flight tasks did not acknowledge cancellation within grace period"
                );
                break;
            }
        }
    }
}

/// Mark every non-terminal task cancelled and publish the change.
async fn cancel_sweep(ctx: &RunContext) {
    let snapshot = {
        let mut graph = ctx.graph.write().await;
        let pending: Vec<TaskId> = graph
            .tasks()
            .filter(|t| !t.is_terminal())
            .map(|t| t.id.clone())
            .collect();
        for id in &pending {
            if let Err(e) = graph.mark_cancelled(id) {
                warn!(task_id = %id, error = %e, "Failed to cancel task");
            }
        }
        graph.status = ConstellationStatus::Cancelled;
        graph.clone()
    };

    info!(constellation_id = %snapshot.id, "Constellation cancelled");
    ctx.bus
        .publish(BusEvent::Graph(GraphChange::new(
            ChangeKind::Cancelled,
            None,
            snapshot,
        )))
        .await;
}

/// Terminal bookkeeping for a pass that ran out of work: decide
/// COMPLETED/FAILED via the completion policy and publish the result.
async fn finalize(ctx: &RunContext) {
    let snapshot = {
        let mut graph = ctx.graph.write().await;
        let stats = graph.statistics();
        graph.status = if ctx.config.completion.graph_failed(&stats) {
            ConstellationStatus::Failed
        } else {
            ConstellationStatus::Completed
        };
        graph.clone()
    };

    info!(
        constellation_id = %snapshot.id,
        status = ?snapshot.status,
        "Scheduling pass finished"
    );
    ctx.bus
        .publish(BusEvent::Graph(GraphChange::new(
            ChangeKind::Completed,
            None,
            snapshot,
        )))
        .await;
}
