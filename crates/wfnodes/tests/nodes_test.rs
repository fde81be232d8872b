// crates/wfnodes/tests/nodes_test.rs

use std::sync::Arc;
use wfcore::{
    EventBus, NdArray, NodeContext, NodeError, ProcessingPlugin, Value, Workflow,
    WorkflowDefinition,
};
use wfnodes::{
    standard_registry, AccumulateNode, ConstantNode, DelayNode, FrameSourceNode, IntegrateNode,
    ThresholdNode,
};
use wfruntime::{Runtime, RuntimeConfig, WorkflowExecutor};

fn cross_image() -> NdArray {
    NdArray::new(
        vec![3, 3],
        vec![0.0, 50.0, 0.0, 50.0, 100.0, 50.0, 0.0, 50.0, 0.0],
    )
    .unwrap()
}

fn context(plugin: &dyn ProcessingPlugin, inputs: &[(&str, Value)]) -> NodeContext {
    let mut params = plugin.signature().instantiate();
    for (name, value) in inputs {
        params.input_mut(name).unwrap().value = value.clone();
    }
    NodeContext::new(plugin.node_type(), params)
}

fn output(ctx: &NodeContext, name: &str) -> Value {
    ctx.params.output(name).unwrap().value.clone()
}

#[tokio::test]
async fn test_threshold_integrate_pipeline() {
    let mut workflow = Workflow::new("saxs");
    workflow.add_process(Arc::new(ConstantNode)).unwrap();
    workflow.add_process(Arc::new(ThresholdNode)).unwrap();
    workflow.add_process(Arc::new(IntegrateNode)).unwrap();
    workflow.set_input("Constant", "value", cross_image()).unwrap();
    workflow.set_input("Integrate", "bins", 2.0).unwrap();
    workflow.connect("Constant", "value", "Threshold", "data").unwrap();
    workflow.connect("Constant", "value", "Integrate", "data").unwrap();
    workflow.connect("Threshold", "mask", "Integrate", "mask").unwrap();

    let result = WorkflowExecutor::new(&RuntimeConfig::default())
        .execute(&mut workflow, &EventBus::new(100))
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.end_tasks, vec!["Integrate".to_string()]);

    let mask = workflow.output_value("Threshold", "mask").unwrap();
    assert_eq!(
        mask.as_ndarray().unwrap().data,
        vec![0.0, 1.0, 0.0, 1.0, 1.0, 1.0, 0.0, 1.0, 0.0]
    );

    let intensity = workflow.output_value("Integrate", "I").unwrap();
    assert_eq!(intensity.as_ndarray().unwrap().data, vec![100.0, 50.0]);
    let q = workflow.output_value("Integrate", "q").unwrap();
    assert_eq!(q.as_ndarray().unwrap().len(), 2);
}

#[tokio::test]
async fn test_frames_stream_into_accumulator() {
    let mut workflow = Workflow::new("frames");
    workflow.add_process(Arc::new(FrameSourceNode)).unwrap();
    workflow.add_process(Arc::new(AccumulateNode)).unwrap();
    workflow.set_input("FrameSource", "count", 4.0).unwrap();
    workflow.set_input("FrameSource", "frame", 2.0).unwrap();
    workflow
        .connect("FrameSource", "frames", "Accumulate", "frames")
        .unwrap();

    let result = WorkflowExecutor::new(&RuntimeConfig::default())
        .execute(&mut workflow, &EventBus::new(100))
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(
        workflow.output_value("Accumulate", "total"),
        Some(&Value::Number(20.0))
    );
    assert_eq!(
        workflow.output_value("Accumulate", "count"),
        Some(&Value::Number(4.0))
    );
    assert_eq!(
        workflow.output_value("FrameSource", "frames"),
        Some(&Value::Number(4.0))
    );
}

#[tokio::test]
async fn test_accumulate_without_stream_uses_input() {
    let mut ctx = context(&AccumulateNode, &[("frames", Value::Number(5.0))]);

    AccumulateNode.evaluate(&mut ctx).await.unwrap();

    assert_eq!(output(&ctx, "total"), Value::Number(5.0));
    assert_eq!(output(&ctx, "count"), Value::Number(1.0));
}

#[tokio::test]
async fn test_threshold_rejects_text() {
    let mut ctx = context(&ThresholdNode, &[("data", Value::from("bright"))]);

    let err = ThresholdNode.evaluate(&mut ctx).await.unwrap_err();

    assert!(matches!(err, NodeError::InvalidInputType { ref field, .. } if field == "data"));
}

#[tokio::test]
async fn test_integrate_rejects_mismatched_data() {
    let mut ctx = context(
        &IntegrateNode,
        &[
            ("mask", Value::from(cross_image())),
            ("data", Value::from(NdArray::from_vec(vec![1.0, 2.0]))),
        ],
    );

    let err = IntegrateNode.evaluate(&mut ctx).await.unwrap_err();

    assert!(matches!(err, NodeError::ExecutionFailed(_)));
}

#[tokio::test]
async fn test_integrate_rejects_inconsistent_mask() {
    let mask = NdArray {
        shape: vec![2, 0],
        data: vec![1.0, 1.0],
    };
    let mut ctx = context(&IntegrateNode, &[("mask", Value::from(mask))]);

    let err = IntegrateNode.evaluate(&mut ctx).await.unwrap_err();

    assert!(matches!(err, NodeError::ExecutionFailed(_)));
}

#[tokio::test]
async fn test_integrate_rejects_bins_outside_bounds() {
    for bins in [1e18, 0.0, f64::NAN] {
        let mut ctx = context(
            &IntegrateNode,
            &[
                ("mask", Value::from(cross_image())),
                ("bins", Value::Number(bins)),
            ],
        );

        let err = IntegrateNode.evaluate(&mut ctx).await.unwrap_err();

        assert!(
            matches!(err, NodeError::Configuration(_)),
            "bins={} gave {:?}",
            bins,
            err
        );
    }
}

#[tokio::test]
async fn test_frame_source_rejects_count_outside_bounds() {
    let mut ctx = context(&FrameSourceNode, &[("count", Value::Number(1e18))]);

    let err = FrameSourceNode.evaluate(&mut ctx).await.unwrap_err();

    assert!(matches!(err, NodeError::Configuration(_)));
}

#[tokio::test]
async fn test_delay_observes_cancellation() {
    let mut ctx = context(
        &DelayNode,
        &[("delay_ms", Value::Number(10_000.0)), ("value", Value::from(true))],
    );
    ctx.cancellation.cancel();

    let err = DelayNode.evaluate(&mut ctx).await.unwrap_err();

    assert_eq!(err, NodeError::Cancelled);
}

#[tokio::test]
async fn test_delay_passes_value_through() {
    let mut ctx = context(
        &DelayNode,
        &[("delay_ms", Value::Number(5.0)), ("value", Value::from("ok"))],
    );

    DelayNode.evaluate(&mut ctx).await.unwrap();

    assert_eq!(output(&ctx, "value"), Value::from("ok"));
}

#[test]
fn test_standard_registry_contents() {
    let registry = standard_registry();

    assert_eq!(
        registry.list_node_types(),
        vec![
            "Accumulate",
            "Constant",
            "DebugLog",
            "Delay",
            "FrameSource",
            "Integrate",
            "Scale",
            "Threshold"
        ]
    );

    let threshold = registry.get_metadata("Threshold").unwrap();
    assert_eq!(threshold.category, "image");
    let minimum = threshold
        .inputs
        .iter()
        .find(|p| p.name == "minimum")
        .unwrap();
    assert_eq!(minimum.default, Value::Number(30.0));
    assert!(!minimum.required);
    assert_eq!(minimum.unit.as_deref(), Some("counts"));
}

#[tokio::test]
async fn test_runtime_runs_definition_with_builtin_nodes() {
    let runtime = Runtime::with_registry(Arc::new(standard_registry()), RuntimeConfig::default());
    let definition: WorkflowDefinition = serde_json::from_value(serde_json::json!({
        "name": "scaled",
        "nodes": [
            { "key": "source", "node_type": "Constant", "inputs": { "value": { "type": "Number", "value": 4.0 } } },
            { "key": "double", "node_type": "Scale", "inputs": { "factor": { "type": "Number", "value": 2.0 } } },
            { "key": "log", "node_type": "DebugLog" }
        ],
        "bindings": [
            { "from_node": "source", "output": "value", "to_node": "double", "input": "data" },
            { "from_node": "double", "output": "scaled", "to_node": "log", "input": "value" }
        ]
    }))
    .unwrap();

    let mut workflow = runtime.load(&definition).unwrap();
    let result = runtime.execute(&mut workflow).await.unwrap();

    assert!(result.is_success());
    let scaled = workflow.output_value("double", "scaled").unwrap();
    assert_eq!(scaled.as_ndarray().unwrap().data, vec![8.0]);
    assert_eq!(
        workflow.output_value("log", "message"),
        Some(&Value::from("(no message)"))
    );
}
