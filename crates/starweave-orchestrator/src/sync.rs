//! Modification synchronizer: reconciles the scheduler's execution-driven
//! view of a constellation with the planner's structural edits.
//!
//! The scheduler only advances status and never regresses; the planner only
//! adds structure. Composing "more advanced status wins" with a structure
//! union therefore yields a single consistent view without either side
//! overwriting the other's authoritative fields.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use starweave_core::{BusEvent, Constellation};

use crate::bus::{EventObserver, ObserverError};

/// Reconciles concurrent structural edits and execution-status advances
/// into one consistent snapshot.
///
/// Holds an internally-updated reference copy of the graph, refreshed from
/// every structural-edit event observed on the bus.
pub struct ModificationSynchronizer {
    reference: RwLock<Option<Constellation>>,
}

impl ModificationSynchronizer {
    /// Create a synchronizer with no reference copy yet.
    pub fn new() -> Self {
        Self {
            reference: RwLock::new(None),
        }
    }

    /// Replace the reference copy.
    pub async fn update_reference(&self, constellation: Constellation) {
        *self.reference.write().await = Some(constellation);
    }

    /// Current reference copy, if any.
    pub async fn reference(&self) -> Option<Constellation> {
        self.reference.read().await.clone()
    }

    /// Merge a candidate snapshot (typically taken from a scheduler-emitted
    /// event, possibly stale relative to concurrent edits) with the
    /// reference copy:
    ///
    /// 1. tasks present only in the reference are added, with their edges;
    /// 2. for tasks present in both, the more advanced status wins and the
    ///    winning side contributes result/error/device/timestamps;
    /// 3. dependency edges are unioned by identity.
    ///
    /// The merged snapshot becomes the new reference copy.
    pub async fn merge_and_sync(&self, candidate: Constellation) -> Constellation {
        let mut guard = self.reference.write().await;

        if guard.is_none() {
            // Nothing observed yet; the candidate is the best view.
            *guard = Some(candidate.clone());
            return candidate;
        }

        let mut merged = candidate;

        if let Some(reference) = guard.as_ref() {
            for task in reference.tasks() {
                if merged.get_task(&task.id).is_none() {
                    debug!(task_id = %task.id, "Merging task missing from candidate");
                    if let Err(e) = merged.add_task(task.clone()) {
                        warn!(task_id = %task.id, error = %e, "Could not merge task");
                    }
                } else if let Some(existing) = merged.get_task_mut(&task.id) {
                    if task.status.rank() > existing.status.rank() {
                        *existing = task.clone();
                    }
                }
            }

            for dep in reference.dependencies() {
                if let Err(e) = merged.add_dependency(dep.clone()) {
                    warn!(error = %e, "Dropping unsatisfiable edge during merge");
                }
            }
        }

        *guard = Some(merged.clone());
        merged
    }
}

impl Default for ModificationSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventObserver for ModificationSynchronizer {
    async fn on_event(&self, event: &BusEvent) -> Result<(), ObserverError> {
        match event {
            BusEvent::Graph(change) => {
                self.update_reference(change.new.clone()).await;
            }
            // Status advances arrive through merge candidates, not here.
            BusEvent::Task(_) => {}
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "synchronizer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starweave_core::{Dependency, Task, TaskId, TaskStatus};

    fn base() -> Constellation {
        let mut c = Constellation::new("merge-test");
        c.add_task(Task::new("t1", "first")).unwrap();
        c.add_task(Task::new("t2", "second")).unwrap();
        c.add_dependency(Dependency::new("t1", "t2")).unwrap();
        c
    }

    #[tokio::test]
    async fn test_no_reference_returns_candidate() {
        let sync = ModificationSynchronizer::new();
        let candidate = base();
        let merged = sync.merge_and_sync(candidate.clone()).await;
        assert_eq!(merged.task_count(), candidate.task_count());
        assert!(sync.reference().await.is_some());
    }

    #[tokio::test]
    async fn test_reference_only_task_is_added_with_edges() {
        let sync = ModificationSynchronizer::new();

        // Reference saw an edit that added t3 downstream of t2.
        let mut edited = base();
        edited.add_task(Task::new("t3", "third")).unwrap();
        edited.add_dependency(Dependency::new("t2", "t3")).unwrap();
        sync.update_reference(edited).await;

        // Candidate is the scheduler's stale snapshot without t3.
        let merged = sync.merge_and_sync(base()).await;

        assert_eq!(merged.task_count(), 3);
        assert_eq!(merged.dependency_count(), 2);
        assert!(merged.get_task(&TaskId::new("t3")).is_some());
    }

    #[tokio::test]
    async fn test_more_advanced_status_wins() {
        let sync = ModificationSynchronizer::new();

        let mut advanced = base();
        advanced
            .mark_completed(&TaskId::new("t1"), Some(serde_json::json!("ok")))
            .unwrap();
        sync.update_reference(advanced).await;

        // Candidate still believes t1 is pending.
        let merged = sync.merge_and_sync(base()).await;

        let t1 = merged.get_task(&TaskId::new("t1")).unwrap();
        assert_eq!(t1.status, TaskStatus::Completed);
        assert_eq!(t1.result, Some(serde_json::json!("ok")));
    }

    #[tokio::test]
    async fn test_candidate_advance_is_kept() {
        let sync = ModificationSynchronizer::new();
        sync.update_reference(base()).await;

        let mut candidate = base();
        candidate.mark_failed(&TaskId::new("t2"), "boom").unwrap();

        let merged = sync.merge_and_sync(candidate).await;
        assert_eq!(
            merged.get_task(&TaskId::new("t2")).unwrap().status,
            TaskStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_merge_idempotence() {
        let sync = ModificationSynchronizer::new();

        let mut edited = base();
        edited.add_task(Task::new("t3", "third")).unwrap();
        sync.update_reference(edited).await;

        let once = sync.merge_and_sync(base()).await;
        let twice = sync.merge_and_sync(once.clone()).await;

        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_observes_graph_changes() {
        use starweave_core::{ChangeKind, GraphChange};

        let sync = ModificationSynchronizer::new();
        let c = base();
        let event = BusEvent::Graph(GraphChange::new(ChangeKind::Created, None, c.clone()));
        sync.on_event(&event).await.unwrap();

        let reference = sync.reference().await.unwrap();
        assert_eq!(reference.id, c.id);
    }
}
