use async_trait::async_trait;
use std::sync::Arc;
use wfcore::{Input, NodeContext, NodeError, Output, ProcessingPlugin, Signature};
use wfruntime::{PluginFactory, PluginMetadata};

/// Emits its configured value unchanged
pub struct ConstantNode;

#[async_trait]
impl ProcessingPlugin for ConstantNode {
    fn node_type(&self) -> &str {
        "Constant"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .input("value", Input::default().describe("Value to emit"))
            .output("value", Output::default())
    }

    async fn evaluate(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
        let value = ctx.input("value").cloned().unwrap_or_default();
        ctx.set_output("value", value)
    }
}

pub struct ConstantNodeFactory;

impl PluginFactory for ConstantNodeFactory {
    fn create(&self) -> Result<Arc<dyn ProcessingPlugin>, NodeError> {
        Ok(Arc::new(ConstantNode))
    }

    fn node_type(&self) -> &str {
        "Constant"
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            description: "Emit a fixed value".to_string(),
            category: "source".to_string(),
            ..PluginMetadata::default()
        }
    }
}
