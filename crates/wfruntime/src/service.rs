//! Submission format accepted by an execution service.
//!
//! A submission maps task ids to a callable plus the ids of the tasks whose
//! results it consumes, in argument order. Any scheduler that honours those
//! dependencies can run it.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wfcore::{FlowError, NodeError, Output, TaskId};

/// Outputs of each dependency, in the task's dependency order
pub type TaskArgs = Vec<Arc<Vec<Output>>>;
pub type TaskFuture = BoxFuture<'static, Result<Vec<Output>, NodeError>>;
pub type TaskFn = Box<dyn FnOnce(TaskArgs, CancellationToken) -> TaskFuture + Send>;

pub struct SubmittedTask {
    pub run: TaskFn,
    pub dependencies: Vec<TaskId>,
    /// Evaluate on the scheduler's own task instead of spawning
    pub local: bool,
}

/// Ordered task graph in the service's format
#[derive(Default)]
pub struct Submission {
    tasks: Vec<(TaskId, SubmittedTask)>,
}

impl Submission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<TaskId>, task: SubmittedTask) {
        self.tasks.push((id.into(), task));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &TaskId> {
        self.tasks.iter().map(|(id, _)| id)
    }

    pub fn dependencies(&self, id: &str) -> Option<&[TaskId]> {
        self.tasks
            .iter()
            .find(|(task_id, _)| task_id == id)
            .map(|(_, task)| task.dependencies.as_slice())
    }

    /// Rejects duplicate ids and dependencies on ids that are not part of
    /// the submission.
    pub fn validate(&self) -> Result<(), FlowError> {
        let mut known = HashSet::with_capacity(self.tasks.len());
        for (id, _) in &self.tasks {
            if !known.insert(id.as_str()) {
                return Err(FlowError::Translation(format!("duplicate task id {}", id)));
            }
        }
        for (id, task) in &self.tasks {
            if let Some(missing) = task
                .dependencies
                .iter()
                .find(|dep| !known.contains(dep.as_str()))
            {
                return Err(FlowError::Translation(format!(
                    "task {} depends on unknown task {}",
                    id, missing
                )));
            }
        }
        Ok(())
    }

    /// Keeps only `targets` and the tasks they transitively depend on.
    /// An empty target list keeps everything.
    pub fn required_for(self, targets: &[TaskId]) -> Self {
        if targets.is_empty() {
            return self;
        }

        let required: HashSet<TaskId> = {
            let deps: HashMap<&TaskId, &Vec<TaskId>> = self
                .tasks
                .iter()
                .map(|(id, task)| (id, &task.dependencies))
                .collect();
            let mut required = HashSet::new();
            let mut frontier: Vec<&TaskId> = targets.iter().collect();
            while let Some(id) = frontier.pop() {
                if required.insert(id.clone()) {
                    if let Some(task_deps) = deps.get(id) {
                        frontier.extend(task_deps.iter());
                    }
                }
            }
            required
        };

        let tasks = self
            .tasks
            .into_iter()
            .filter(|(id, _)| required.contains(id))
            .collect();
        Self { tasks }
    }

    pub fn into_tasks(self) -> Vec<(TaskId, SubmittedTask)> {
        self.tasks
    }
}

/// Final state of a task after a submission ran
#[derive(Debug, Clone)]
pub enum TaskStatus {
    Completed(Arc<Vec<Output>>),
    Failed(NodeError),
    /// Never run because `failed_dependency` failed upstream
    Skipped { failed_dependency: TaskId },
}

impl TaskStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskStatus::Completed(_))
    }

    pub fn outputs(&self) -> Option<&[Output]> {
        match self {
            TaskStatus::Completed(outputs) => Some(outputs.as_slice()),
            _ => None,
        }
    }
}

/// Per-task statuses returned by a service
#[derive(Debug, Default)]
pub struct ServiceReport {
    pub statuses: HashMap<TaskId, TaskStatus>,
}

/// External service executing a submitted task graph
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Run everything `targets` needs and report each task's outcome.
    ///
    /// A malformed submission must be rejected with
    /// `FlowError::Translation` before anything runs.
    async fn submit(
        &self,
        submission: Submission,
        targets: &[TaskId],
        cancellation: CancellationToken,
    ) -> Result<ServiceReport, FlowError>;
}
