use async_trait::async_trait;
use std::sync::Arc;
use wfcore::{Input, NodeContext, NodeError, Output, ProcessingPlugin, Signature};
use wfruntime::{PluginFactory, PluginMetadata};

/// Simple debug node that logs its inputs
pub struct DebugLogNode;

#[async_trait]
impl ProcessingPlugin for DebugLogNode {
    fn node_type(&self) -> &str {
        "DebugLog"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .input("message", Input::default().with_default("(no message)"))
            .input("value", Input::default())
            .output("message", Output::default())
    }

    async fn evaluate(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
        let message = ctx
            .input("message")
            .and_then(|v| v.as_str())
            .unwrap_or("(no message)")
            .to_string();

        ctx.events.info(format!("DEBUG: {}", message));
        tracing::info!("[{}] {}", ctx.node, message);

        if let Some(value) = ctx.input("value").filter(|v| !v.is_null()) {
            let rendered = serde_json::to_string(value)
                .map_err(|e| NodeError::ExecutionFailed(format!("JSON stringify error: {}", e)))?;
            ctx.events.info(format!("  value: {}", rendered));
        }

        ctx.set_output("message", message)
    }
}

pub struct DebugLogNodeFactory;

impl PluginFactory for DebugLogNodeFactory {
    fn create(&self) -> Result<Arc<dyn ProcessingPlugin>, NodeError> {
        Ok(Arc::new(DebugLogNode))
    }

    fn node_type(&self) -> &str {
        "DebugLog"
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            description: "Logs input values for debugging".to_string(),
            category: "debug".to_string(),
            ..PluginMetadata::default()
        }
    }
}
