//! The constellation: a DAG of tasks joined by conditioned dependency edges.

use crate::{ConstellationId, ConstellationStatus, CoreError, DeviceId, Task, TaskId, TaskStatus};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Condition on a dependency edge, evaluated against the upstream outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeCondition {
    /// Satisfied exactly when the upstream task completed successfully.
    /// This is the common, unconditional case.
    #[default]
    Success,
    /// Satisfied once the upstream task is terminal, regardless of outcome.
    AnyOutcome,
}

impl EdgeCondition {
    /// Evaluate the condition against the upstream task's current status.
    pub fn is_satisfied(&self, upstream: TaskStatus) -> bool {
        match self {
            Self::Success => upstream == TaskStatus::Completed,
            Self::AnyOutcome => upstream.is_terminal(),
        }
    }
}

/// A directed dependency edge: `from` must satisfy `condition` before `to`
/// can become ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Upstream task.
    pub from: TaskId,

    /// Downstream task.
    pub to: TaskId,

    /// Condition over the upstream outcome.
    pub condition: EdgeCondition,
}

impl Dependency {
    /// Create an unconditional (success) dependency edge.
    pub fn new(from: impl Into<TaskId>, to: impl Into<TaskId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: EdgeCondition::Success,
        }
    }

    /// Builder method to set the edge condition.
    pub fn with_condition(mut self, condition: EdgeCondition) -> Self {
        self.condition = condition;
        self
    }
}

/// Outcome of a structural validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True when no violations were found.
    pub is_valid: bool,

    /// Human-readable descriptions of every violation found.
    pub violations: Vec<String>,
}

/// Counts of tasks by status, plus totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl Statistics {
    /// Number of tasks in a terminal state.
    pub fn terminal(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }
}

/// A constellation: the task graph for one user request.
///
/// Task insertion order is preserved for display purposes only; it carries
/// no scheduling semantics. The scheduler is the sole writer of per-task
/// status/result/error, the planner the sole writer of structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constellation {
    /// Unique constellation identifier.
    pub id: ConstellationId,

    /// Display name.
    pub name: String,

    /// Overall state of this constellation.
    pub status: ConstellationStatus,

    tasks: HashMap<TaskId, Task>,

    /// Task ids in insertion order, for display iteration.
    order: Vec<TaskId>,

    dependencies: Vec<Dependency>,
}

impl Constellation {
    /// Create a new, empty constellation.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ConstellationId::generate(),
            name: name.into(),
            status: ConstellationStatus::Pending,
            tasks: HashMap::new(),
            order: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Builder method to set a specific ID (useful for testing).
    pub fn with_id(mut self, id: ConstellationId) -> Self {
        self.id = id;
        self
    }

    /// Add a task. Errors if a task with the same id already exists.
    pub fn add_task(&mut self, task: Task) -> Result<(), CoreError> {
        if self.tasks.contains_key(&task.id) {
            return Err(CoreError::DuplicateTask(task.id));
        }
        self.order.push(task.id.clone());
        self.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    /// Add a dependency edge. Errors if either endpoint is missing; an
    /// identical existing edge is ignored (edges are a set by identity).
    pub fn add_dependency(&mut self, dep: Dependency) -> Result<(), CoreError> {
        for endpoint in [&dep.from, &dep.to] {
            if !self.tasks.contains_key(endpoint) {
                return Err(CoreError::MissingEndpoint {
                    from: dep.from.clone(),
                    to: dep.to.clone(),
                    missing: endpoint.clone(),
                });
            }
        }
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
        Ok(())
    }

    /// Look up a task by id.
    pub fn get_task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Look up a task mutably by id.
    pub fn get_task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    /// Iterate tasks in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    /// Number of tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// All dependency edges.
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Number of dependency edges.
    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }

    /// Incoming edges of a task.
    pub fn incoming<'a>(&'a self, id: &'a TaskId) -> impl Iterator<Item = &'a Dependency> + 'a {
        self.dependencies.iter().filter(move |d| &d.to == id)
    }

    /// Validate the structure: every edge endpoint must exist, no task may
    /// depend on itself, and the edges must form an acyclic graph.
    ///
    /// Violations are reported, never silently repaired.
    pub fn validate(&self) -> ValidationReport {
        let mut violations = Vec::new();

        for dep in &self.dependencies {
            for endpoint in [&dep.from, &dep.to] {
                if !self.tasks.contains_key(endpoint) {
                    violations.push(format!(
                        "dependency {} -> {} references missing task '{}'",
                        dep.from, dep.to, endpoint
                    ));
                }
            }
            if dep.from == dep.to {
                violations.push(format!("task '{}' depends on itself", dep.from));
            }
        }

        // Cycle check over the well-formed subset of edges. Edge direction:
        // upstream -> downstream, so a topological sort fails iff a cycle
        // exists.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for id in self.tasks.keys() {
            graph.add_node(id.as_str());
        }
        for dep in &self.dependencies {
            if dep.from != dep.to
                && self.tasks.contains_key(&dep.from)
                && self.tasks.contains_key(&dep.to)
            {
                graph.add_edge(dep.from.as_str(), dep.to.as_str(), ());
            }
        }
        if let Err(cycle) = toposort(&graph, None) {
            violations.push(format!(
                "cycle detected involving task '{}'",
                cycle.node_id()
            ));
        }

        ValidationReport {
            is_valid: violations.is_empty(),
            violations,
        }
    }

    /// All `Pending` tasks whose every incoming edge condition is satisfied.
    ///
    /// A task downstream of a failed or cancelled upstream under a `Success`
    /// condition never becomes ready; it stays blocked until a structural
    /// edit reroutes the edge.
    pub fn ready_tasks(&self) -> Vec<&Task> {
        self.tasks()
            .filter(|task| task.status == TaskStatus::Pending)
            .filter(|task| {
                self.incoming(&task.id).all(|dep| {
                    self.tasks
                        .get(&dep.from)
                        .is_some_and(|up| dep.condition.is_satisfied(up.status))
                })
            })
            .collect()
    }

    /// True iff every task is terminal and no ready task exists.
    pub fn is_complete(&self) -> bool {
        self.tasks.values().all(|t| t.status.is_terminal()) && self.ready_tasks().is_empty()
    }

    /// Mark a task as running, recording the device when already known.
    pub fn mark_running(&mut self, id: &TaskId, device: Option<DeviceId>) -> Result<(), CoreError> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| CoreError::TaskNotFound(id.clone()))?;
        task.start(device);
        Ok(())
    }

    /// Mark a task as completed with an optional result payload.
    pub fn mark_completed(
        &mut self,
        id: &TaskId,
        result: Option<serde_json::Value>,
    ) -> Result<(), CoreError> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| CoreError::TaskNotFound(id.clone()))?;
        task.complete(result);
        Ok(())
    }

    /// Mark a task as failed with an error detail.
    pub fn mark_failed(&mut self, id: &TaskId, error: impl Into<String>) -> Result<(), CoreError> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| CoreError::TaskNotFound(id.clone()))?;
        task.fail(error);
        Ok(())
    }

    /// Mark a task as cancelled.
    pub fn mark_cancelled(&mut self, id: &TaskId) -> Result<(), CoreError> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| CoreError::TaskNotFound(id.clone()))?;
        task.cancel();
        Ok(())
    }

    /// Reopen a completed constellation after structure was added.
    pub fn reopen(&mut self) {
        if self.status == ConstellationStatus::Completed {
            self.status = ConstellationStatus::Running;
        }
    }

    /// Counts of tasks by status.
    pub fn statistics(&self) -> Statistics {
        let mut stats = Statistics {
            total: self.tasks.len(),
            ..Statistics::default()
        };
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}
