use crate::events::EventEmitter;
use crate::{
    NodeContext, NodeError, NodeKey, Output, Parameters, PortRef, ProcessNode, ProcessingPlugin,
    StreamPorts,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Which input a positional upstream result is assigned to, and which
/// upstream output it is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgBinding {
    pub input: String,
    pub source: PortRef,
}

/// Runtime resources handed to one invocation
pub struct TaskEnv {
    pub events: EventEmitter,
    pub cancellation: CancellationToken,
    pub streams: StreamPorts,
}

impl TaskEnv {
    pub fn new(events: EventEmitter, cancellation: CancellationToken, streams: StreamPorts) -> Self {
        Self {
            events,
            cancellation,
            streams,
        }
    }

    /// No listeners, never cancelled, no channels
    pub fn detached(node: impl Into<NodeKey>) -> Self {
        Self::new(
            EventEmitter::detached(node),
            CancellationToken::new(),
            StreamPorts::default(),
        )
    }
}

/// Executable wrapper around a single workflow node.
///
/// Holds a snapshot of the node parameters taken at compile time. Each
/// call to [`invoke`](Self::invoke) evaluates a fresh copy of that
/// snapshot, so repeated invocations never share state.
#[derive(Clone)]
pub struct WorkflowProcess {
    node: NodeKey,
    plugin: Arc<dyn ProcessingPlugin>,
    params: Parameters,
    named_args: Vec<ArgBinding>,
    islocal: bool,
}

impl WorkflowProcess {
    pub fn new(node: &ProcessNode, named_args: Vec<ArgBinding>, islocal: bool) -> Self {
        Self {
            node: node.key().to_string(),
            plugin: Arc::clone(node.plugin()),
            params: node.params().clone(),
            named_args,
            islocal,
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn node_type(&self) -> &str {
        self.plugin.node_type()
    }

    pub fn named_args(&self) -> &[ArgBinding] {
        &self.named_args
    }

    /// Number of positional upstream results expected by `invoke`
    pub fn arity(&self) -> usize {
        self.named_args.len()
    }

    pub fn is_local(&self) -> bool {
        self.islocal
    }

    /// Binds upstream results to inputs, evaluates, and returns every output.
    ///
    /// `args[i]` is the output list of the i-th dependency and feeds
    /// `named_args[i]`. Arguments are applied in order, so when several
    /// sources are bound to one input the last one wins.
    pub async fn invoke(
        &self,
        args: &[Arc<Vec<Output>>],
        env: TaskEnv,
    ) -> Result<Vec<Output>, NodeError> {
        if env.cancellation.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        if args.len() != self.named_args.len() {
            return Err(NodeError::MissingUpstream {
                expected: self.named_args.len(),
                received: args.len(),
            });
        }

        let mut params = self.params.clone();
        for (upstream, binding) in args.iter().zip(&self.named_args) {
            let source = upstream
                .iter()
                .find(|o| o.name == binding.source.port)
                .or_else(|| upstream.first())
                .ok_or_else(|| NodeError::MissingInput(binding.input.clone()))?;

            let input = params
                .input_mut(&binding.input)
                .ok_or_else(|| NodeError::UnknownPort(binding.input.clone()))?;
            if !input.in_bounds(&source.value) {
                tracing::warn!(
                    "Value {} from {} is outside the bounds of {}.{}",
                    source.value.summary(),
                    binding.source,
                    self.node,
                    binding.input
                );
            }
            input.value = source.value.clone();
        }

        let mut ctx = NodeContext {
            node: self.node.clone(),
            params,
            events: env.events,
            cancellation: env.cancellation,
            streams: env.streams,
        };

        tracing::debug!("Evaluating {} ({})", self.node, self.node_type());
        self.plugin.evaluate(&mut ctx).await?;

        Ok(ctx.params.outputs().to_vec())
    }
}

impl std::fmt::Debug for WorkflowProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowProcess")
            .field("node", &self.node)
            .field("named_args", &self.named_args)
            .field("islocal", &self.islocal)
            .finish()
    }
}
