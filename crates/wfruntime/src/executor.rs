use crate::channels::BindingChannels;
use crate::config::RuntimeConfig;
use crate::graph::TaskDiGraph;
use crate::scheduler::LocalScheduler;
use crate::service::{
    ExecutionService, Submission, SubmittedTask, TaskArgs, TaskFn, TaskFuture, TaskStatus,
};
use chrono::Utc;
use std::collections::HashMap;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use wfcore::{
    EventBus, ExecutionEvent, ExecutionId, FlowError, NodeError, NodeKey, Output, TaskEnv,
    TaskGraph, TaskId, Workflow,
};

/// Compiles workflows, hands them to an execution service and writes the
/// results back onto the workflow nodes
pub struct WorkflowExecutor<S = LocalScheduler> {
    service: S,
    local_execution: bool,
}

impl WorkflowExecutor<LocalScheduler> {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            service: LocalScheduler::from_config(config),
            local_execution: config.local_execution,
        }
    }
}

impl<S: ExecutionService> WorkflowExecutor<S> {
    pub fn with_service(service: S) -> Self {
        Self {
            service,
            local_execution: false,
        }
    }

    pub fn local_execution(mut self, local: bool) -> Self {
        self.local_execution = local;
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Execute a workflow and return results
    pub async fn execute(
        &self,
        workflow: &mut Workflow,
        event_bus: &EventBus,
    ) -> Result<ExecutionResult, FlowError> {
        self.execute_with_handle(workflow, event_bus, &ExecutionHandle::new())
            .await
    }

    /// Execute a workflow that can be cancelled through `handle`
    pub async fn execute_with_handle(
        &self,
        workflow: &mut Workflow,
        event_bus: &EventBus,
        handle: &ExecutionHandle,
    ) -> Result<ExecutionResult, FlowError> {
        let execution_id = handle.execution_id;
        let start_time = Instant::now();

        event_bus.emit(ExecutionEvent::WorkflowStarted {
            execution_id,
            workflow: workflow.name().to_string(),
            tasks: workflow.len(),
            timestamp: Utc::now(),
        });

        tracing::info!(
            "Starting workflow execution: {} ({})",
            workflow.name(),
            execution_id
        );

        let result = self
            .run(workflow, event_bus, execution_id, handle.token())
            .await;

        let duration_ms = start_time.elapsed().as_millis() as u64;
        let success = matches!(&result, Ok(r) if r.is_success());

        match &result {
            Ok(r) => tracing::info!(
                "Workflow {} finished in {}ms: {}/{} tasks completed",
                workflow.name(),
                duration_ms,
                r.completed_nodes(),
                r.total_nodes()
            ),
            Err(e) => tracing::error!("Workflow {} failed: {}", workflow.name(), e),
        }

        event_bus.emit(ExecutionEvent::WorkflowCompleted {
            execution_id,
            success,
            duration_ms,
            timestamp: Utc::now(),
        });

        result
    }

    async fn run(
        &self,
        workflow: &mut Workflow,
        event_bus: &EventBus,
        execution_id: ExecutionId,
        cancellation: CancellationToken,
    ) -> Result<ExecutionResult, FlowError> {
        let (graph, end_tasks) = workflow.convert_graph_with(self.local_execution)?;

        let layout: Vec<(TaskId, NodeKey, Vec<TaskId>)> = graph
            .iter()
            .map(|(id, task)| {
                (
                    id.clone(),
                    task.process.node().to_string(),
                    task.dependencies.clone(),
                )
            })
            .collect();
        let targets: Vec<TaskId> = end_tasks
            .iter()
            .filter_map(|node| graph.id_of(node).cloned())
            .collect();

        let mut channels = BindingChannels::provision(workflow);
        let submission = translate(graph, &mut channels, event_bus, execution_id)?;

        let report = self
            .service
            .submit(submission, &targets, cancellation)
            .await?;

        let tasks = reconcile(&layout, report.statuses);

        for task in &tasks {
            match &task.status {
                TaskStatus::Completed(outputs) => workflow.apply_outputs(&task.node, outputs)?,
                TaskStatus::Skipped { failed_dependency } => {
                    event_bus.emit(ExecutionEvent::TaskSkipped {
                        execution_id,
                        task_id: task.task_id.clone(),
                        node: task.node.clone(),
                        failed_dependency: failed_dependency.clone(),
                        timestamp: Utc::now(),
                    });
                }
                TaskStatus::Failed(_) => {}
            }
        }

        Ok(ExecutionResult {
            execution_id,
            tasks,
            end_tasks,
        })
    }
}

/// Converts a compiled task graph into the service submission format.
///
/// Fails fast on a graph that cannot be executed as-is: unknown
/// dependency ids, cycles, or a task whose bound arguments do not line up
/// with its dependency list.
pub fn translate(
    graph: TaskGraph,
    channels: &mut BindingChannels,
    event_bus: &EventBus,
    execution_id: ExecutionId,
) -> Result<Submission, FlowError> {
    TaskDiGraph::build(&graph)?.topological_order()?;

    let mut submission = Submission::new();
    for (id, task) in graph.into_tasks() {
        if task.process.arity() != task.dependencies.len() {
            return Err(FlowError::Translation(format!(
                "task {} binds {} arguments but lists {} dependencies",
                id,
                task.process.arity(),
                task.dependencies.len()
            )));
        }

        let node = task.process.node().to_string();
        let local = task.process.is_local();
        let streams = channels.take(&node);
        let emitter = event_bus.create_emitter(execution_id, node.clone());
        let bus = event_bus.clone();
        let process = task.process;
        let task_id = id.clone();

        let run: TaskFn = Box::new(
            move |args: TaskArgs, cancellation: CancellationToken| -> TaskFuture {
                Box::pin(async move {
                    bus.emit(ExecutionEvent::TaskStarted {
                        execution_id,
                        task_id: task_id.clone(),
                        node: node.clone(),
                        node_type: process.node_type().to_string(),
                        timestamp: Utc::now(),
                    });

                    let start = Instant::now();
                    let env = TaskEnv::new(emitter, cancellation, streams);
                    let result = process.invoke(&args, env).await;
                    let duration_ms = start.elapsed().as_millis() as u64;

                    match &result {
                        Ok(outputs) => bus.emit(ExecutionEvent::TaskCompleted {
                            execution_id,
                            task_id,
                            node,
                            outputs: outputs
                                .iter()
                                .map(|o| (o.name.clone(), o.value.clone()))
                                .collect(),
                            duration_ms,
                            timestamp: Utc::now(),
                        }),
                        Err(error) => bus.emit(ExecutionEvent::TaskFailed {
                            execution_id,
                            task_id,
                            node,
                            error: error.to_string(),
                            timestamp: Utc::now(),
                        }),
                    }
                    result
                })
            },
        );

        submission.insert(
            id,
            SubmittedTask {
                run,
                dependencies: task.dependencies,
                local,
            },
        );
    }

    Ok(submission)
}

/// Settles the final status of every task in graph order. A task below a
/// failure is reported skipped even if the service went ahead and ran it.
fn reconcile(
    layout: &[(TaskId, NodeKey, Vec<TaskId>)],
    mut reported: HashMap<TaskId, TaskStatus>,
) -> Vec<TaskReport> {
    let mut settled: HashMap<&TaskId, TaskStatus> = HashMap::with_capacity(layout.len());
    let mut reports = Vec::with_capacity(layout.len());

    for (id, node, deps) in layout {
        let upstream_failure = deps.iter().find_map(|dep| match settled.get(dep) {
            Some(TaskStatus::Failed(_)) => Some(dep.clone()),
            Some(TaskStatus::Skipped { failed_dependency }) => Some(failed_dependency.clone()),
            _ => None,
        });

        let status = match (upstream_failure, reported.remove(id)) {
            (Some(_), Some(status @ TaskStatus::Skipped { .. })) => status,
            (Some(failed_dependency), status) => {
                if matches!(status, Some(TaskStatus::Completed(_))) {
                    tracing::warn!(
                        "Task {} ran although {} failed; discarding its outputs",
                        id,
                        failed_dependency
                    );
                }
                TaskStatus::Skipped { failed_dependency }
            }
            (None, Some(status)) => status,
            (None, None) => TaskStatus::Failed(NodeError::ExecutionFailed(
                "no result reported by the execution service".to_string(),
            )),
        };

        settled.insert(id, status.clone());
        reports.push(TaskReport {
            task_id: id.clone(),
            node: node.clone(),
            status,
        });
    }

    reports
}

/// Final status of one task
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub node: NodeKey,
    pub status: TaskStatus,
}

/// Result of workflow execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub execution_id: ExecutionId,
    /// Every task, in compiled order
    pub tasks: Vec<TaskReport>,
    pub end_tasks: Vec<NodeKey>,
}

impl ExecutionResult {
    pub fn status_of(&self, node: &str) -> Option<&TaskStatus> {
        self.tasks
            .iter()
            .find(|t| t.node == node)
            .map(|t| &t.status)
    }

    pub fn outputs_of(&self, node: &str) -> Option<&[Output]> {
        self.status_of(node).and_then(TaskStatus::outputs)
    }

    pub fn completed_nodes(&self) -> usize {
        self.tasks.iter().filter(|t| t.status.is_completed()).count()
    }

    pub fn total_nodes(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_success(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_completed())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&NodeKey, &NodeError)> {
        self.tasks.iter().filter_map(|t| match &t.status {
            TaskStatus::Failed(error) => Some((&t.node, error)),
            _ => None,
        })
    }

    pub fn skipped(&self) -> impl Iterator<Item = &NodeKey> {
        self.tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Skipped { .. }))
            .map(|t| &t.node)
    }

    /// Reports for the workflow's end tasks only
    pub fn end_results(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks.iter().filter(|t| self.end_tasks.contains(&t.node))
    }
}

/// Handle for cancelling an execution from another task
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    pub execution_id: ExecutionId,
    cancellation: CancellationToken,
}

impl ExecutionHandle {
    pub fn new() -> Self {
        Self {
            execution_id: ExecutionId::new_v4(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Signals every running node. Tasks not yet started are never run and
    /// are reported as `Failed(Cancelled)`, or skipped below a failure.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.cancellation.clone()
    }
}

impl Default for ExecutionHandle {
    fn default() -> Self {
        Self::new()
    }
}
