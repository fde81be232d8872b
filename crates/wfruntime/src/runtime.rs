use crate::config::RuntimeConfig;
use crate::executor::{ExecutionHandle, ExecutionResult, WorkflowExecutor};
use crate::registry::PluginRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use wfcore::{EventBus, ExecutionEvent, FlowError, Workflow, WorkflowDefinition, WorkflowError};

/// Main runtime for executing workflows
pub struct Runtime {
    registry: Arc<PluginRegistry>,
    executor: Arc<WorkflowExecutor>,
    event_bus: Arc<EventBus>,
    workflows: Arc<RwLock<HashMap<String, Workflow>>>,
    config: RuntimeConfig,
}

impl Runtime {
    /// Create a new runtime with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        let registry = Arc::new(PluginRegistry::new());
        Self::with_registry(registry, config)
    }

    /// Create a new runtime with a pre-configured registry
    pub fn with_registry(registry: Arc<PluginRegistry>, config: RuntimeConfig) -> Self {
        let executor = Arc::new(WorkflowExecutor::new(&config));
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));

        Self {
            registry,
            executor,
            event_bus,
            workflows: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Build a workflow from its definition using the registered plugins
    pub fn load(&self, definition: &WorkflowDefinition) -> Result<Workflow, FlowError> {
        let workflow = Workflow::from_definition(definition, |node_type| {
            self.registry.create_plugin(node_type)
        })?;
        workflow.check_consistency()?;
        Ok(workflow)
    }

    /// Register a workflow under its name, replacing any previous one
    pub async fn register_workflow(&self, workflow: Workflow) {
        let mut workflows = self.workflows.write().await;
        workflows.insert(workflow.name().to_string(), workflow);
    }

    /// Remove a registered workflow, with the outputs of its last execution
    pub async fn take_workflow(&self, name: &str) -> Option<Workflow> {
        self.workflows.write().await.remove(name)
    }

    /// Execute a registered workflow by name
    pub async fn execute_workflow(&self, name: &str) -> Result<ExecutionResult, FlowError> {
        let mut workflows = self.workflows.write().await;
        let workflow = workflows
            .get_mut(name)
            .ok_or_else(|| FlowError::Workflow(WorkflowError::NotFound(name.to_string())))?;

        self.executor.execute(workflow, &self.event_bus).await
    }

    /// Execute a workflow directly (without registration)
    pub async fn execute(&self, workflow: &mut Workflow) -> Result<ExecutionResult, FlowError> {
        self.executor.execute(workflow, &self.event_bus).await
    }

    /// Execute a workflow that can be cancelled through `handle`
    pub async fn execute_with_handle(
        &self,
        workflow: &mut Workflow,
        handle: &ExecutionHandle,
    ) -> Result<ExecutionResult, FlowError> {
        self.executor
            .execute_with_handle(workflow, &self.event_bus, handle)
            .await
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
