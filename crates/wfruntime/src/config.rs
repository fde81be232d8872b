use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use wfcore::FlowError;

/// Configuration for the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub max_parallel_nodes: usize,
    pub event_buffer_size: usize,
    /// Per-node evaluation limit
    pub node_timeout_ms: Option<u64>,
    pub on_error: ErrorHandling,
    /// Compile processes as local (evaluated on the scheduler task
    /// instead of being spawned)
    pub local_execution: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 10,
            event_buffer_size: 1000,
            node_timeout_ms: None,
            on_error: ErrorHandling::StopWorkflow,
            local_execution: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn node_timeout(&self) -> Option<Duration> {
        self.node_timeout_ms.map(Duration::from_millis)
    }
}

/// What happens to the rest of the graph once a task fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorHandling {
    /// Skip every task not yet started and cancel running ones
    StopWorkflow,
    /// Skip only descendants of the failed task
    ContinueOnError,
}
