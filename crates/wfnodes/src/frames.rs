//! Incremental frame delivery over binding channels.
//!
//! `FrameSource` pushes each frame to its subscribers as soon as it is
//! produced; `Accumulate` drains whatever arrived on its `frames` input.

use crate::array::{add_values, require_count};
use async_trait::async_trait;
use std::sync::Arc;
use wfcore::{Input, NodeContext, NodeError, Output, ProcessingPlugin, Signature, Value};
use wfruntime::{PluginFactory, PluginMetadata};

/// Streams `count` copies of `frame`, the n-th scaled by n
pub struct FrameSourceNode;

#[async_trait]
impl ProcessingPlugin for FrameSourceNode {
    fn node_type(&self) -> &str {
        "FrameSource"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .input(
                "count",
                Input::default()
                    .describe("Number of frames to stream")
                    .with_default(3.0)
                    .with_bounds(1.0, 10_000.0),
            )
            .input("frame", Input::default().with_default(1.0))
            .output(
                "frames",
                Output::default().describe("Streamed frames; value is the frame count"),
            )
    }

    async fn evaluate(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
        let count = require_count(ctx, "count")?;
        let frame = ctx.require_input("frame")?.clone();

        for n in 1..=count {
            if ctx.is_cancelled() {
                return Err(NodeError::Cancelled);
            }
            let scaled = match &frame {
                Value::Number(x) => Value::Number(x * n as f64),
                Value::NdArray(a) => Value::NdArray(a.map(|x| x * n as f64)),
                other => other.clone(),
            };
            let delivered = ctx.publish("frames", scaled);
            ctx.events.progress(
                n as f64 / count as f64 * 100.0,
                Some(format!("frame {} sent to {} subscribers", n, delivered)),
            );
            tokio::task::yield_now().await;
        }

        ctx.set_output("frames", count as f64)
    }
}

pub struct FrameSourceNodeFactory;

impl PluginFactory for FrameSourceNodeFactory {
    fn create(&self) -> Result<Arc<dyn ProcessingPlugin>, NodeError> {
        Ok(Arc::new(FrameSourceNode))
    }

    fn node_type(&self) -> &str {
        "FrameSource"
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            description: "Stream a sequence of frames to subscribers".to_string(),
            category: "source".to_string(),
            ..PluginMetadata::default()
        }
    }
}

/// Sums the frames received on `frames`
pub struct AccumulateNode;

#[async_trait]
impl ProcessingPlugin for AccumulateNode {
    fn node_type(&self) -> &str {
        "Accumulate"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .input("frames", Input::default())
            .output("total", Output::default())
            .output("count", Output::default())
    }

    async fn evaluate(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
        let receivers = ctx.take_stream("frames");
        let mut total = Value::Null;
        let mut count = 0usize;

        if receivers.is_empty() {
            // Unbound: the input value is the only frame
            if let Some(value) = ctx.input("frames").filter(|v| !v.is_null()) {
                total = value.clone();
                count = 1;
            }
        }

        for mut rx in receivers {
            while let Some(frame) = rx.recv().await {
                total = add_values(&total, &frame)?;
                count += 1;
            }
        }

        tracing::debug!("{} accumulated {} frames", ctx.node, count);
        ctx.set_output("total", total)?;
        ctx.set_output("count", count as f64)
    }
}

pub struct AccumulateNodeFactory;

impl PluginFactory for AccumulateNodeFactory {
    fn create(&self) -> Result<Arc<dyn ProcessingPlugin>, NodeError> {
        Ok(Arc::new(AccumulateNode))
    }

    fn node_type(&self) -> &str {
        "Accumulate"
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            description: "Sum frames streamed by an upstream source".to_string(),
            category: "reduction".to_string(),
            ..PluginMetadata::default()
        }
    }
}
