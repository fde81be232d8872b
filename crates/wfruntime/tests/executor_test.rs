// crates/wfruntime/tests/executor_test.rs

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wfcore::{
    EventBus, ExecutionEvent, FlowError, Input, NodeContext, NodeError, Output, ProcessingPlugin,
    Signature, TaskId, Value, Workflow, WorkflowDefinition,
};
use wfruntime::{
    BindingChannels, ErrorHandling, ExecutionHandle, ExecutionService, LocalScheduler,
    PluginFactory, PluginRegistry, Runtime, RuntimeConfig, ServiceReport, SubmittedTask,
    Submission, TaskArgs, TaskDiGraph, TaskFuture, TaskStatus, WorkflowExecutor,
};

/// Emits its `value` input unchanged
struct Source;

#[async_trait]
impl ProcessingPlugin for Source {
    fn node_type(&self) -> &str {
        "Source"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .input("value", Input::default().with_default(1.0))
            .output("output", Output::default())
    }

    async fn evaluate(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
        let value = ctx.require_input("value")?.clone();
        ctx.set_output("output", value)
    }
}

struct AddOne;

#[async_trait]
impl ProcessingPlugin for AddOne {
    fn node_type(&self) -> &str {
        "AddOne"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .input("input", Input::default())
            .output("output", Output::default())
    }

    async fn evaluate(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
        let value = ctx.require_number("input")?;
        ctx.set_output("output", value + 1.0)
    }
}

struct Fail;

#[async_trait]
impl ProcessingPlugin for Fail {
    fn node_type(&self) -> &str {
        "Fail"
    }

    fn signature(&self) -> Signature {
        Signature::new().output("output", Output::default())
    }

    async fn evaluate(&self, _ctx: &mut NodeContext) -> Result<(), NodeError> {
        Err(NodeError::ExecutionFailed("detector offline".to_string()))
    }
}

/// Sleeps for ten seconds unless cancelled
struct Slow;

#[async_trait]
impl ProcessingPlugin for Slow {
    fn node_type(&self) -> &str {
        "Slow"
    }

    fn signature(&self) -> Signature {
        Signature::new().output("output", Output::default())
    }

    async fn evaluate(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
        let cancelled = tokio::select! {
            _ = ctx.cancellation.cancelled() => true,
            _ = tokio::time::sleep(Duration::from_secs(10)) => false,
        };
        if cancelled {
            return Err(NodeError::Cancelled);
        }
        ctx.set_output("output", 1.0)
    }
}

/// Panics during evaluation
struct Explode;

#[async_trait]
impl ProcessingPlugin for Explode {
    fn node_type(&self) -> &str {
        "Explode"
    }

    fn signature(&self) -> Signature {
        Signature::new().output("output", Output::default())
    }

    async fn evaluate(&self, _ctx: &mut NodeContext) -> Result<(), NodeError> {
        panic!("sensor overflow")
    }
}

/// Streams 1..=count on its output channel
struct Producer;

#[async_trait]
impl ProcessingPlugin for Producer {
    fn node_type(&self) -> &str {
        "Producer"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .input("count", Input::default().with_default(3.0))
            .output("out", Output::default())
    }

    async fn evaluate(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
        let count = ctx.require_number("count")? as usize;
        for i in 1..=count {
            ctx.publish("out", i as f64);
        }
        ctx.set_output("out", count as f64)
    }
}

/// Sums everything received on its input channel
struct Collector;

#[async_trait]
impl ProcessingPlugin for Collector {
    fn node_type(&self) -> &str {
        "Collector"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .input("in", Input::default())
            .output("total", Output::default())
            .output("received", Output::default())
    }

    async fn evaluate(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
        let mut total = 0.0;
        let mut received = 0.0;
        for mut rx in ctx.take_stream("in") {
            while let Some(value) = rx.recv().await {
                total += value.as_f64().unwrap_or_default();
                received += 1.0;
            }
        }
        ctx.set_output("total", total)?;
        ctx.set_output("received", received)
    }
}

struct AddOneFactory;

impl PluginFactory for AddOneFactory {
    fn create(&self) -> Result<Arc<dyn ProcessingPlugin>, NodeError> {
        Ok(Arc::new(AddOne))
    }

    fn node_type(&self) -> &str {
        "AddOne"
    }
}

struct SourceFactory;

impl PluginFactory for SourceFactory {
    fn create(&self) -> Result<Arc<dyn ProcessingPlugin>, NodeError> {
        Ok(Arc::new(Source))
    }

    fn node_type(&self) -> &str {
        "Source"
    }
}

/// Reports task "0" failed and every other task completed, without
/// running anything
struct CarelessService;

#[async_trait]
impl ExecutionService for CarelessService {
    async fn submit(
        &self,
        submission: Submission,
        _targets: &[TaskId],
        _cancellation: CancellationToken,
    ) -> Result<ServiceReport, FlowError> {
        let mut report = ServiceReport::default();
        for id in submission.ids() {
            let status = if id == "0" {
                TaskStatus::Failed(NodeError::ExecutionFailed("lost worker".to_string()))
            } else {
                TaskStatus::Completed(Arc::new(vec![Output {
                    value: Value::Number(99.0),
                    ..Output::new("output")
                }]))
            };
            report.statuses.insert(id.clone(), status);
        }
        Ok(report)
    }
}

fn noop_task(deps: &[&str]) -> SubmittedTask {
    SubmittedTask {
        run: Box::new(|_: TaskArgs, _: CancellationToken| -> TaskFuture {
            Box::pin(async { Ok(Vec::new()) })
        }),
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
        local: true,
    }
}

fn executor(config: RuntimeConfig) -> WorkflowExecutor {
    WorkflowExecutor::new(&config)
}

fn chain() -> Workflow {
    let mut workflow = Workflow::new("chain");
    workflow.add_process(Arc::new(Source)).unwrap();
    workflow.add_process_as("first", Arc::new(AddOne)).unwrap();
    workflow.add_process_as("second", Arc::new(AddOne)).unwrap();
    workflow.set_input("Source", "value", 2.0).unwrap();
    workflow.connect("Source", "output", "first", "input").unwrap();
    workflow.connect("first", "output", "second", "input").unwrap();
    workflow
}

#[tokio::test]
async fn test_chain_outputs_written_back() {
    let mut workflow = chain();
    let bus = EventBus::new(100);

    let result = executor(RuntimeConfig::default())
        .execute(&mut workflow, &bus)
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.completed_nodes(), 3);
    assert_eq!(result.end_tasks, vec!["second".to_string()]);
    assert_eq!(
        workflow.output_value("first", "output"),
        Some(&Value::Number(3.0))
    );
    assert_eq!(
        workflow.output_value("second", "output"),
        Some(&Value::Number(4.0))
    );
    let end: Vec<&str> = result.end_results().map(|r| r.node.as_str()).collect();
    assert_eq!(end, vec!["second"]);
}

#[tokio::test]
async fn test_local_execution_matches_spawned() {
    let mut workflow = chain();
    let bus = EventBus::new(100);
    let config = RuntimeConfig {
        local_execution: true,
        ..RuntimeConfig::default()
    };

    let result = executor(config).execute(&mut workflow, &bus).await.unwrap();

    assert!(result.is_success());
    assert_eq!(
        workflow.output_value("second", "output"),
        Some(&Value::Number(4.0))
    );
}

#[tokio::test]
async fn test_panicking_node_fails_alone_in_both_modes() {
    for local_execution in [false, true] {
        let mut workflow = Workflow::new("panic");
        workflow.add_process(Arc::new(Explode)).unwrap();
        workflow.add_process_as("after", Arc::new(AddOne)).unwrap();
        workflow.add_process(Arc::new(Source)).unwrap();
        workflow.connect("Explode", "output", "after", "input").unwrap();

        let config = RuntimeConfig {
            local_execution,
            on_error: ErrorHandling::ContinueOnError,
            ..RuntimeConfig::default()
        };
        let result = executor(config)
            .execute(&mut workflow, &EventBus::new(100))
            .await
            .unwrap();

        match result.status_of("Explode") {
            Some(TaskStatus::Failed(NodeError::ExecutionFailed(message))) => {
                assert!(message.contains("sensor overflow"), "{}", message)
            }
            other => panic!("local={}: expected failure, got {:?}", local_execution, other),
        }
        assert!(matches!(
            result.status_of("after"),
            Some(TaskStatus::Skipped { .. })
        ));
        assert!(result.status_of("Source").unwrap().is_completed());
    }
}

#[tokio::test]
async fn test_failure_skips_only_descendants() {
    let mut workflow = Workflow::new("partial");
    workflow.add_process(Arc::new(Fail)).unwrap();
    workflow.add_process_as("child", Arc::new(AddOne)).unwrap();
    workflow.add_process(Arc::new(Source)).unwrap();
    workflow.add_process_as("other", Arc::new(AddOne)).unwrap();
    workflow.connect("Fail", "output", "child", "input").unwrap();
    workflow.connect("Source", "output", "other", "input").unwrap();

    let config = RuntimeConfig {
        on_error: ErrorHandling::ContinueOnError,
        ..RuntimeConfig::default()
    };
    let result = executor(config)
        .execute(&mut workflow, &EventBus::new(100))
        .await
        .unwrap();

    assert!(!result.is_success());
    assert!(matches!(
        result.status_of("Fail"),
        Some(TaskStatus::Failed(NodeError::ExecutionFailed(_)))
    ));
    match result.status_of("child") {
        Some(TaskStatus::Skipped { failed_dependency }) => assert_eq!(failed_dependency, "0"),
        other => panic!("child should be skipped, got {:?}", other),
    }
    assert!(result.status_of("other").unwrap().is_completed());
    assert_eq!(workflow.output_value("child", "output"), Some(&Value::Null));
    assert_eq!(
        workflow.output_value("other", "output"),
        Some(&Value::Number(2.0))
    );
    assert_eq!(result.skipped().collect::<Vec<_>>(), vec!["child"]);
}

#[tokio::test]
async fn test_stop_workflow_skips_pending_tasks() {
    let mut workflow = Workflow::new("halt");
    workflow.add_process(Arc::new(Fail)).unwrap();
    workflow.add_process(Arc::new(Source)).unwrap();

    let config = RuntimeConfig {
        max_parallel_nodes: 1,
        on_error: ErrorHandling::StopWorkflow,
        ..RuntimeConfig::default()
    };
    let result = executor(config)
        .execute(&mut workflow, &EventBus::new(100))
        .await
        .unwrap();

    assert_eq!(result.failures().count(), 1);
    assert!(matches!(
        result.status_of("Source"),
        Some(TaskStatus::Skipped { .. })
    ));
    assert_eq!(workflow.output_value("Source", "output"), Some(&Value::Null));
}

#[tokio::test]
async fn test_events_emitted_in_order() {
    let mut workflow = chain();
    let bus = EventBus::new(100);
    let mut events = bus.subscribe();

    executor(RuntimeConfig::default())
        .execute(&mut workflow, &bus)
        .await
        .unwrap();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    assert!(matches!(
        received.first(),
        Some(ExecutionEvent::WorkflowStarted { tasks: 3, .. })
    ));
    assert!(matches!(
        received.last(),
        Some(ExecutionEvent::WorkflowCompleted { success: true, .. })
    ));
    let started = received
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::TaskStarted { .. }))
        .count();
    let completed = received
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::TaskCompleted { .. }))
        .count();
    assert_eq!(started, 3);
    assert_eq!(completed, 3);
}

#[tokio::test]
async fn test_stream_channels_fan_out() {
    let mut workflow = Workflow::new("stream");
    workflow.add_process(Arc::new(Producer)).unwrap();
    workflow.add_process_as("left", Arc::new(Collector)).unwrap();
    workflow.add_process_as("right", Arc::new(Collector)).unwrap();
    workflow.connect("Producer", "out", "left", "in").unwrap();
    workflow.connect("Producer", "out", "right", "in").unwrap();

    assert_eq!(BindingChannels::provision(&workflow).len(), 2);

    let result = executor(RuntimeConfig::default())
        .execute(&mut workflow, &EventBus::new(100))
        .await
        .unwrap();

    assert!(result.is_success());
    for consumer in ["left", "right"] {
        assert_eq!(
            workflow.output_value(consumer, "total"),
            Some(&Value::Number(6.0))
        );
        assert_eq!(
            workflow.output_value(consumer, "received"),
            Some(&Value::Number(3.0))
        );
    }
}

#[tokio::test]
async fn test_cancellation_reaches_running_node() {
    let mut workflow = Workflow::new("cancel");
    workflow.add_process(Arc::new(Slow)).unwrap();
    workflow.add_process_as("after", Arc::new(AddOne)).unwrap();
    workflow.connect("Slow", "output", "after", "input").unwrap();

    let handle = ExecutionHandle::new();
    let canceller = handle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let result = executor(RuntimeConfig::default())
        .execute_with_handle(&mut workflow, &EventBus::new(100), &handle)
        .await
        .unwrap();

    assert_eq!(result.execution_id, handle.execution_id);
    assert!(matches!(
        result.status_of("Slow"),
        Some(TaskStatus::Failed(NodeError::Cancelled))
    ));
    assert!(matches!(
        result.status_of("after"),
        Some(TaskStatus::Skipped { .. })
    ));
}

#[tokio::test]
async fn test_cancel_prevents_unstarted_tasks() {
    let mut workflow = Workflow::new("cancel-pending");
    workflow.add_process(Arc::new(Slow)).unwrap();
    workflow.add_process(Arc::new(Source)).unwrap();

    let config = RuntimeConfig {
        max_parallel_nodes: 1,
        on_error: ErrorHandling::ContinueOnError,
        ..RuntimeConfig::default()
    };
    let bus = EventBus::new(100);
    let mut events = bus.subscribe();
    let handle = ExecutionHandle::new();
    let canceller = handle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let result = executor(config)
        .execute_with_handle(&mut workflow, &bus, &handle)
        .await
        .unwrap();

    for node in ["Slow", "Source"] {
        assert!(matches!(
            result.status_of(node),
            Some(TaskStatus::Failed(NodeError::Cancelled))
        ));
    }
    assert_eq!(workflow.output_value("Source", "output"), Some(&Value::Null));

    let mut started = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ExecutionEvent::TaskStarted { node, .. } = event {
            started.push(node);
        }
    }
    assert_eq!(started, vec!["Slow".to_string()]);
}

#[tokio::test]
async fn test_zero_event_buffer_is_usable() {
    let config: RuntimeConfig = serde_json::from_str(r#"{"event_buffer_size":0}"#).unwrap();
    let runtime = Runtime::with_config(config);
    let _events = runtime.subscribe_events();

    let mut workflow = Workflow::new("quiet");
    workflow.add_process(Arc::new(Source)).unwrap();
    let result = runtime.execute(&mut workflow).await.unwrap();

    assert!(result.is_success());
    assert_eq!(
        workflow.output_value("Source", "output"),
        Some(&Value::Number(1.0))
    );
}

#[tokio::test]
async fn test_node_timeout() {
    let mut workflow = Workflow::new("timeout");
    workflow.add_process(Arc::new(Slow)).unwrap();

    let config = RuntimeConfig {
        node_timeout_ms: Some(50),
        ..RuntimeConfig::default()
    };
    let result = executor(config)
        .execute(&mut workflow, &EventBus::new(100))
        .await
        .unwrap();

    assert!(matches!(
        result.status_of("Slow"),
        Some(TaskStatus::Failed(NodeError::Timeout { millis: 50 }))
    ));
}

#[tokio::test]
async fn test_cyclic_workflow_is_rejected_before_dispatch() {
    let mut workflow = Workflow::new("cycle");
    workflow.add_process_as("a", Arc::new(AddOne)).unwrap();
    workflow.add_process_as("b", Arc::new(AddOne)).unwrap();
    workflow.connect("a", "output", "b", "input").unwrap();
    workflow.connect("b", "output", "a", "input").unwrap();

    let err = executor(RuntimeConfig::default())
        .execute(&mut workflow, &EventBus::new(100))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FlowError::Workflow(wfcore::WorkflowError::Cycle { .. })
    ));
}

#[tokio::test]
async fn test_scheduler_rejects_unknown_dependency() {
    let mut submission = Submission::new();
    submission.insert("0", noop_task(&["7"]));

    let err = LocalScheduler::new(2)
        .submit(submission, &["0".to_string()], CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::Translation(_)));
}

#[test]
fn test_submission_pruned_to_targets() {
    let mut submission = Submission::new();
    submission.insert("0", noop_task(&[]));
    submission.insert("1", noop_task(&["0"]));
    submission.insert("2", noop_task(&[]));

    let pruned = submission.required_for(&["1".to_string()]);

    assert_eq!(pruned.ids().collect::<Vec<_>>(), vec!["0", "1"]);
}

#[tokio::test]
async fn test_descendants_of_reported_failure_are_skipped() {
    let mut workflow = chain();

    let result = WorkflowExecutor::with_service(CarelessService)
        .execute(&mut workflow, &EventBus::new(100))
        .await
        .unwrap();

    assert!(matches!(
        result.status_of("Source"),
        Some(TaskStatus::Failed(_))
    ));
    assert!(matches!(
        result.status_of("first"),
        Some(TaskStatus::Skipped { .. })
    ));
    assert!(matches!(
        result.status_of("second"),
        Some(TaskStatus::Skipped { .. })
    ));
    assert_eq!(workflow.output_value("second", "output"), Some(&Value::Null));
}

#[test]
fn test_task_digraph_order_and_dot() {
    let mut workflow = chain();
    let (graph, _) = workflow.convert_graph().unwrap();

    let view = TaskDiGraph::build(&graph).unwrap();
    assert_eq!(view.node_count(), 3);
    assert_eq!(view.edge_count(), 2);
    assert_eq!(view.topological_order().unwrap(), vec!["0", "1", "2"]);

    let dot = view.to_dot();
    assert!(dot.contains("digraph"));
    assert!(dot.contains("first [1]"));
}

#[test]
fn test_registry_metadata_from_signature() {
    let mut registry = PluginRegistry::new();
    registry.register(Arc::new(AddOneFactory));

    assert_eq!(registry.list_node_types(), vec!["AddOne".to_string()]);
    let metadata = registry.get_metadata("AddOne").unwrap();
    assert_eq!(metadata.category, "general");
    assert_eq!(metadata.inputs[0].name, "input");
    assert!(metadata.inputs[0].required);
    assert_eq!(metadata.outputs[0].name, "output");

    assert!(matches!(
        registry.create_plugin("Missing"),
        Err(wfcore::WorkflowError::UnknownNodeType(_))
    ));
}

#[tokio::test]
async fn test_runtime_loads_and_runs_registered_workflow() {
    let mut registry = PluginRegistry::new();
    registry.register(Arc::new(SourceFactory));
    registry.register(Arc::new(AddOneFactory));
    let runtime = Runtime::with_registry(Arc::new(registry), RuntimeConfig::default());

    let definition: WorkflowDefinition = serde_json::from_value(serde_json::json!({
        "name": "loaded",
        "nodes": [
            { "key": "src", "node_type": "Source", "inputs": { "value": { "type": "Number", "value": 41.0 } } },
            { "key": "inc", "node_type": "AddOne" }
        ],
        "bindings": [
            { "from_node": "src", "output": "output", "to_node": "inc", "input": "input" }
        ]
    }))
    .unwrap();

    let workflow = runtime.load(&definition).unwrap();
    runtime.register_workflow(workflow).await;

    let result = runtime.execute_workflow("loaded").await.unwrap();
    assert!(result.is_success());

    let workflow = runtime.take_workflow("loaded").await.unwrap();
    assert_eq!(
        workflow.output_value("inc", "output"),
        Some(&Value::Number(42.0))
    );
    assert!(runtime.execute_workflow("loaded").await.is_err());
}
