//! Per-binding value channels attached to a node for one execution.
//!
//! Every `(output, input)` binding gets its own channel with exactly one
//! producer and one consumer. A producer whose output fans out holds one
//! sender per subscribed input.

use crate::{PortRef, Value};
use std::collections::HashMap;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

#[derive(Debug, Default)]
pub struct StreamPorts {
    outbound: HashMap<String, Vec<(PortRef, UnboundedSender<Value>)>>,
    inbound: HashMap<String, Vec<(PortRef, UnboundedReceiver<Value>)>>,
}

impl StreamPorts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the sending half for `output`, feeding `consumer`.
    pub fn attach_sender(
        &mut self,
        output: impl Into<String>,
        consumer: PortRef,
        sender: UnboundedSender<Value>,
    ) {
        self.outbound
            .entry(output.into())
            .or_default()
            .push((consumer, sender));
    }

    /// Registers the receiving half for `input`, fed by `producer`.
    pub fn attach_receiver(
        &mut self,
        input: impl Into<String>,
        producer: PortRef,
        receiver: UnboundedReceiver<Value>,
    ) {
        self.inbound
            .entry(input.into())
            .or_default()
            .push((producer, receiver));
    }

    /// Pushes `value` to every consumer of `output` and returns how many
    /// consumers received it.
    pub fn publish(&self, output: &str, value: &Value) -> usize {
        self.outbound
            .get(output)
            .map(|senders| {
                senders
                    .iter()
                    .filter(|(consumer, sender)| {
                        let delivered = sender.send(value.clone()).is_ok();
                        if !delivered {
                            tracing::debug!("Consumer {} dropped its channel", consumer);
                        }
                        delivered
                    })
                    .count()
            })
            .unwrap_or(0)
    }

    /// Takes the receivers bound to `input`, in binding order.
    pub fn take_inbound(&mut self, input: &str) -> Vec<UnboundedReceiver<Value>> {
        self.inbound
            .remove(input)
            .map(|receivers| receivers.into_iter().map(|(_, rx)| rx).collect())
            .unwrap_or_default()
    }

    pub fn outbound_count(&self) -> usize {
        self.outbound.values().map(Vec::len).sum()
    }

    pub fn inbound_count(&self) -> usize {
        self.inbound.values().map(Vec::len).sum()
    }
}
