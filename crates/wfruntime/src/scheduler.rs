use crate::config::{ErrorHandling, RuntimeConfig};
use crate::service::{
    ExecutionService, ServiceReport, SubmittedTask, Submission, TaskArgs, TaskStatus,
};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wfcore::{FlowError, NodeError, Output, TaskId};

type Finished = (TaskId, Result<Vec<Output>, NodeError>, u64);

/// In-process execution service running tasks on the tokio runtime
#[derive(Debug, Clone)]
pub struct LocalScheduler {
    max_parallel: usize,
    task_timeout: Option<Duration>,
    on_error: ErrorHandling,
}

impl LocalScheduler {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
            task_timeout: None,
            on_error: ErrorHandling::StopWorkflow,
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            max_parallel: config.max_parallel_nodes.max(1),
            task_timeout: config.node_timeout(),
            on_error: config.on_error,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    pub fn with_error_handling(mut self, on_error: ErrorHandling) -> Self {
        self.on_error = on_error;
        self
    }

    fn launch(
        &self,
        id: TaskId,
        task: SubmittedTask,
        args: TaskArgs,
        cancellation: CancellationToken,
    ) -> BoxFuture<'static, Finished> {
        let limit = self.task_timeout;
        let local = task.local;
        let future = (task.run)(args, cancellation);

        let timed = async move {
            let start = Instant::now();
            let result = match limit {
                Some(limit) => match tokio::time::timeout(limit, future).await {
                    Ok(result) => result,
                    Err(_) => Err(NodeError::Timeout {
                        millis: limit.as_millis() as u64,
                    }),
                },
                None => future.await,
            };
            (result, start.elapsed().as_millis() as u64)
        };

        if local {
            // Inline tasks share the scheduler's stack, so a panic is caught
            // here the same way a spawned task reports one through its JoinError.
            Box::pin(async move {
                match AssertUnwindSafe(timed).catch_unwind().await {
                    Ok((result, duration_ms)) => (id, result, duration_ms),
                    Err(panic) => (
                        id,
                        Err(NodeError::ExecutionFailed(format!(
                            "Task panicked: {}",
                            panic_message(panic.as_ref())
                        ))),
                        0,
                    ),
                }
            })
        } else {
            let handle = tokio::spawn(timed);
            Box::pin(async move {
                match handle.await {
                    Ok((result, duration_ms)) => (id, result, duration_ms),
                    Err(e) if e.is_panic() => {
                        let panic = e.into_panic();
                        (
                            id,
                            Err(NodeError::ExecutionFailed(format!(
                                "Task panicked: {}",
                                panic_message(panic.as_ref())
                            ))),
                            0,
                        )
                    }
                    Err(e) => (
                        id,
                        Err(NodeError::ExecutionFailed(format!("Task join error: {}", e))),
                        0,
                    ),
                }
            })
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

impl Default for LocalScheduler {
    fn default() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }
}

/// Marks pending tasks downstream of a failure as skipped, repeating until
/// nothing changes. Once the run is halted every pending task is skipped.
fn skip_blocked(
    order: &[TaskId],
    dependencies: &HashMap<TaskId, Vec<TaskId>>,
    pending: &mut HashMap<TaskId, SubmittedTask>,
    statuses: &mut HashMap<TaskId, TaskStatus>,
    halted: Option<&TaskId>,
) {
    loop {
        let mut changed = false;
        for id in order {
            if !pending.contains_key(id) {
                continue;
            }
            let blocked_by = match halted {
                Some(failed) => Some(failed.clone()),
                None => dependencies[id].iter().find_map(|dep| match statuses.get(dep) {
                    Some(TaskStatus::Failed(_)) => Some(dep.clone()),
                    Some(TaskStatus::Skipped { failed_dependency }) => {
                        Some(failed_dependency.clone())
                    }
                    _ => None,
                }),
            };
            if let Some(failed_dependency) = blocked_by {
                pending.remove(id);
                tracing::debug!("Skipping task {} after failure of {}", id, failed_dependency);
                statuses.insert(id.clone(), TaskStatus::Skipped { failed_dependency });
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

#[async_trait]
impl ExecutionService for LocalScheduler {
    async fn submit(
        &self,
        submission: Submission,
        targets: &[TaskId],
        cancellation: CancellationToken,
    ) -> Result<ServiceReport, FlowError> {
        submission.validate()?;
        let submission = submission.required_for(targets);
        let run_token = cancellation.child_token();

        let mut order = Vec::with_capacity(submission.len());
        let mut dependencies = HashMap::with_capacity(submission.len());
        let mut pending = HashMap::with_capacity(submission.len());
        for (id, task) in submission.into_tasks() {
            order.push(id.clone());
            dependencies.insert(id.clone(), task.dependencies.clone());
            pending.insert(id, task);
        }

        let mut statuses: HashMap<TaskId, TaskStatus> = HashMap::new();
        let mut running = FuturesUnordered::new();
        let mut halted: Option<TaskId> = None;

        loop {
            skip_blocked(
                &order,
                &dependencies,
                &mut pending,
                &mut statuses,
                halted.as_ref(),
            );

            // Nothing new starts once the caller cancelled the run
            if cancellation.is_cancelled() {
                for id in &order {
                    if pending.remove(id).is_some() {
                        tracing::debug!("Task {} not started: execution cancelled", id);
                        statuses.insert(id.clone(), TaskStatus::Failed(NodeError::Cancelled));
                    }
                }
            }

            // Spawn ready tasks up to the parallel limit
            for id in &order {
                if running.len() >= self.max_parallel {
                    break;
                }
                if !pending.contains_key(id) {
                    continue;
                }
                let deps = &dependencies[id];
                let ready = deps
                    .iter()
                    .all(|dep| statuses.get(dep).map_or(false, TaskStatus::is_completed));
                if !ready {
                    continue;
                }
                let Some(task) = pending.remove(id) else {
                    continue;
                };
                let args: TaskArgs = deps
                    .iter()
                    .filter_map(|dep| match statuses.get(dep) {
                        Some(TaskStatus::Completed(outputs)) => Some(Arc::clone(outputs)),
                        _ => None,
                    })
                    .collect();
                tracing::debug!("Starting task {}", id);
                running.push(self.launch(id.clone(), task, args, run_token.clone()));
            }

            let Some((id, result, duration_ms)) = running.next().await else {
                break;
            };

            match result {
                Ok(outputs) => {
                    tracing::debug!("Task {} completed in {}ms", id, duration_ms);
                    statuses.insert(id, TaskStatus::Completed(Arc::new(outputs)));
                }
                Err(error) => {
                    tracing::warn!("Task {} failed after {}ms: {}", id, duration_ms, error);
                    if self.on_error == ErrorHandling::StopWorkflow && halted.is_none() {
                        halted = Some(id.clone());
                        run_token.cancel();
                    }
                    statuses.insert(id, TaskStatus::Failed(error));
                }
            }
        }

        if !pending.is_empty() {
            return Err(FlowError::Execution(format!(
                "{} tasks could not be scheduled",
                pending.len()
            )));
        }

        Ok(ServiceReport { statuses })
    }
}
