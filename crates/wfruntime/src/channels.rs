use std::collections::HashMap;
use tokio::sync::mpsc;
use wfcore::{NodeKey, PortRef, StreamPorts, Workflow};

/// Channels provisioned for one execution, one per `(output, input)` binding.
#[derive(Debug, Default)]
pub struct BindingChannels {
    ports: HashMap<NodeKey, StreamPorts>,
    bindings: usize,
}

impl BindingChannels {
    /// Creates a fresh channel for every subscription in the workflow.
    pub fn provision(workflow: &Workflow) -> Self {
        let mut channels = Self::default();
        for node in workflow.nodes() {
            for output in node.outputs() {
                let producer = PortRef::new(node.key(), output.name.as_str());
                for consumer in &output.subscriptions {
                    let (sender, receiver) = mpsc::unbounded_channel();
                    channels
                        .ports
                        .entry(node.key().to_string())
                        .or_default()
                        .attach_sender(output.name.as_str(), consumer.clone(), sender);
                    channels
                        .ports
                        .entry(consumer.node.clone())
                        .or_default()
                        .attach_receiver(consumer.port.as_str(), producer.clone(), receiver);
                    channels.bindings += 1;
                }
            }
        }
        tracing::debug!(
            "Provisioned {} binding channels for {}",
            channels.bindings,
            workflow.name()
        );
        channels
    }

    /// Number of channels created
    pub fn len(&self) -> usize {
        self.bindings
    }

    pub fn is_empty(&self) -> bool {
        self.bindings == 0
    }

    /// Hands the node's channel ends over; later calls return empty ports.
    pub fn take(&mut self, node: &str) -> StreamPorts {
        self.ports.remove(node).unwrap_or_default()
    }
}
