use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use wfcore::{Input, NodeContext, NodeError, Output, ProcessingPlugin, Signature};
use wfruntime::{PluginFactory, PluginMetadata};

/// Waits `delay_ms` before passing its value through
pub struct DelayNode;

#[async_trait]
impl ProcessingPlugin for DelayNode {
    fn node_type(&self) -> &str {
        "Delay"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .input("value", Input::default())
            .input(
                "delay_ms",
                Input::default()
                    .with_unit("ms")
                    .with_default(1000.0)
                    .with_min(0.0),
            )
            .output("value", Output::default())
    }

    async fn evaluate(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
        let delay_ms = ctx.require_number("delay_ms")?.max(0.0) as u64;
        ctx.events.info(format!("Delaying for {}ms", delay_ms));

        let cancelled = tokio::select! {
            _ = ctx.cancellation.cancelled() => true,
            _ = sleep(Duration::from_millis(delay_ms)) => false,
        };
        if cancelled {
            return Err(NodeError::Cancelled);
        }

        let value = ctx.input("value").cloned().unwrap_or_default();
        ctx.set_output("value", value)
    }
}

pub struct DelayNodeFactory;

impl PluginFactory for DelayNodeFactory {
    fn create(&self) -> Result<Arc<dyn ProcessingPlugin>, NodeError> {
        Ok(Arc::new(DelayNode))
    }

    fn node_type(&self) -> &str {
        "Delay"
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            description: "Delay execution for specified milliseconds".to_string(),
            category: "time".to_string(),
            ..PluginMetadata::default()
        }
    }
}
