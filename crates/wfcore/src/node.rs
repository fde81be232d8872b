use crate::events::EventEmitter;
use crate::{Input, NodeError, NodeKey, Output, Parameters, Signature, StreamPorts, TaskId, Value};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

/// Core trait that every processing plugin implements
#[async_trait]
pub trait ProcessingPlugin: Send + Sync {
    /// Type name (e.g., "Threshold", "Integrate"); default workflow key
    fn node_type(&self) -> &str;

    /// Inputs and outputs declared by this plugin type
    fn signature(&self) -> Signature;

    /// Read inputs from `ctx`, write outputs back into it
    async fn evaluate(&self, ctx: &mut NodeContext) -> Result<(), NodeError>;
}

/// Execution context passed to `evaluate`
pub struct NodeContext {
    pub node: NodeKey,

    /// This invocation's copy of the node parameters
    pub params: Parameters,

    pub events: EventEmitter,

    /// Cooperative cancellation for long-running evaluations
    pub cancellation: CancellationToken,

    /// Per-binding channels for incremental results
    pub streams: StreamPorts,
}

impl NodeContext {
    pub fn new(node: impl Into<NodeKey>, params: Parameters) -> Self {
        let node = node.into();
        Self {
            events: EventEmitter::detached(node.clone()),
            node,
            params,
            cancellation: CancellationToken::new(),
            streams: StreamPorts::default(),
        }
    }

    pub fn input(&self, name: &str) -> Option<&Value> {
        self.params.input(name).map(|i| &i.value)
    }

    /// Get required input or return error
    pub fn require_input(&self, name: &str) -> Result<&Value, NodeError> {
        self.params.require_input(name)
    }

    /// Required numeric input
    pub fn require_number(&self, name: &str) -> Result<f64, NodeError> {
        let value = self.require_input(name)?;
        value.as_f64().ok_or_else(|| NodeError::InvalidInputType {
            field: name.to_string(),
            expected: "number".to_string(),
            actual: value.kind().to_string(),
        })
    }

    pub fn set_output(&mut self, name: &str, value: impl Into<Value>) -> Result<(), NodeError> {
        self.params.set_output(name, value)
    }

    /// Streams `value` to every input subscribed to `output`.
    pub fn publish(&self, output: &str, value: impl Into<Value>) -> usize {
        self.streams.publish(output, &value.into())
    }

    pub fn take_stream(&mut self, input: &str) -> Vec<UnboundedReceiver<Value>> {
        self.streams.take_inbound(input)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// One plugin instance placed in a workflow
#[derive(Clone)]
pub struct ProcessNode {
    key: NodeKey,
    plugin: Arc<dyn ProcessingPlugin>,
    pub(crate) params: Parameters,
    pub(crate) id: Option<TaskId>,
}

impl ProcessNode {
    /// Instantiates the plugin signature into storage owned by this node.
    pub fn new(key: impl Into<NodeKey>, plugin: Arc<dyn ProcessingPlugin>) -> Self {
        let params = plugin.signature().instantiate();
        Self {
            key: key.into(),
            plugin,
            params,
            id: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn node_type(&self) -> &str {
        self.plugin.node_type()
    }

    pub fn plugin(&self) -> &Arc<dyn ProcessingPlugin> {
        &self.plugin
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn inputs(&self) -> &[Input] {
        self.params.inputs()
    }

    pub fn outputs(&self) -> &[Output] {
        self.params.outputs()
    }

    pub fn input(&self, name: &str) -> Option<&Input> {
        self.params.input(name)
    }

    pub fn output(&self, name: &str) -> Option<&Output> {
        self.params.output(name)
    }

    /// Edits an input in place. Bindings belong to `Workflow::connect`;
    /// touching `map_inputs` here leaves the producer side out of sync.
    pub fn input_mut(&mut self, name: &str) -> Option<&mut Input> {
        self.params.input_mut(name)
    }

    /// Task id assigned by the last `convert_graph`
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl fmt::Debug for ProcessNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessNode")
            .field("key", &self.key)
            .field("node_type", &self.plugin.node_type())
            .field("params", &self.params)
            .field("id", &self.id)
            .finish()
    }
}
