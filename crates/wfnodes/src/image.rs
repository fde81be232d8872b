use crate::array::require_array;
use async_trait::async_trait;
use std::sync::Arc;
use wfcore::{Input, NodeContext, NodeError, Output, ProcessingPlugin, Signature, ValueKind};
use wfruntime::{PluginFactory, PluginMetadata};

/// Binary mask of the samples at or above `minimum`
pub struct ThresholdNode;

#[async_trait]
impl ProcessingPlugin for ThresholdNode {
    fn node_type(&self) -> &str {
        "Threshold"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .input("data", Input::default().describe("Detector image"))
            .input(
                "minimum",
                Input::default()
                    .describe("Lowest accepted intensity")
                    .with_unit("counts")
                    .with_default(30.0)
                    .with_bounds(0.0, 255.0)
                    .with_kind(ValueKind::Number),
            )
            .output(
                "mask",
                Output::default()
                    .describe("1 where data >= minimum, else 0")
                    .with_kind(ValueKind::NdArray),
            )
    }

    async fn evaluate(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
        let data = require_array(ctx, "data")?;
        let minimum = ctx.require_number("minimum")?;

        let mask = data.map(|x| if x >= minimum { 1.0 } else { 0.0 });
        let kept = mask.data.iter().filter(|m| **m > 0.0).count();
        ctx.events
            .info(format!("{} of {} samples above {}", kept, mask.len(), minimum));

        ctx.set_output("mask", mask)
    }
}

pub struct ThresholdNodeFactory;

impl PluginFactory for ThresholdNodeFactory {
    fn create(&self) -> Result<Arc<dyn ProcessingPlugin>, NodeError> {
        Ok(Arc::new(ThresholdNode))
    }

    fn node_type(&self) -> &str {
        "Threshold"
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            description: "Mask samples below a minimum intensity".to_string(),
            category: "image".to_string(),
            ..PluginMetadata::default()
        }
    }
}

/// Multiplies every sample by `factor`
pub struct ScaleNode;

#[async_trait]
impl ProcessingPlugin for ScaleNode {
    fn node_type(&self) -> &str {
        "Scale"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .input("data", Input::default())
            .input("factor", Input::default().with_default(1.0))
            .output("scaled", Output::default().with_kind(ValueKind::NdArray))
    }

    async fn evaluate(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
        let data = require_array(ctx, "data")?;
        let factor = ctx.require_number("factor")?;
        ctx.set_output("scaled", data.map(|x| x * factor))
    }
}

pub struct ScaleNodeFactory;

impl PluginFactory for ScaleNodeFactory {
    fn create(&self) -> Result<Arc<dyn ProcessingPlugin>, NodeError> {
        Ok(Arc::new(ScaleNode))
    }

    fn node_type(&self) -> &str {
        "Scale"
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            description: "Scale samples by a constant factor".to_string(),
            category: "image".to_string(),
            ..PluginMetadata::default()
        }
    }
}
