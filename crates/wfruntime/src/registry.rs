use std::collections::HashMap;
use std::sync::Arc;
use wfcore::{NodeError, ProcessingPlugin, Signature, Value, WorkflowError};

/// Factory trait for creating plugin instances
pub trait PluginFactory: Send + Sync {
    /// Create a new instance of the plugin
    fn create(&self) -> Result<Arc<dyn ProcessingPlugin>, NodeError>;

    /// Get plugin type identifier
    fn node_type(&self) -> &str;

    /// Optional: description and category; ports are filled in from the
    /// plugin signature by the registry
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::default()
    }
}

/// Metadata about a plugin type
#[derive(Debug, Clone)]
pub struct PluginMetadata {
    pub description: String,
    pub category: String,
    pub inputs: Vec<PortDefinition>,
    pub outputs: Vec<PortDefinition>,
}

impl Default for PluginMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortDefinition {
    pub name: String,
    pub description: String,
    pub unit: Option<String>,
    /// Inputs without a default must be bound or set
    pub required: bool,
    pub default: Value,
}

impl PortDefinition {
    fn from_signature(signature: &Signature) -> (Vec<Self>, Vec<Self>) {
        let params = signature.instantiate();
        let inputs = params
            .inputs()
            .iter()
            .map(|i| PortDefinition {
                name: i.name.clone(),
                description: i.description.clone(),
                unit: i.unit.clone(),
                required: i.default.is_null(),
                default: i.default.clone(),
            })
            .collect();
        let outputs = params
            .outputs()
            .iter()
            .map(|o| PortDefinition {
                name: o.name.clone(),
                description: o.description.clone(),
                unit: o.unit.clone(),
                required: false,
                default: Value::Null,
            })
            .collect();
        (inputs, outputs)
    }
}

/// Registry of available plugin types
pub struct PluginRegistry {
    factories: HashMap<String, Arc<dyn PluginFactory>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a plugin factory
    pub fn register(&mut self, factory: Arc<dyn PluginFactory>) {
        let node_type = factory.node_type().to_string();
        tracing::info!("Registering plugin type: {}", node_type);
        self.factories.insert(node_type, factory);
    }

    /// Create a plugin instance from its type name
    pub fn create_plugin(&self, node_type: &str) -> Result<Arc<dyn ProcessingPlugin>, WorkflowError> {
        let factory = self
            .factories
            .get(node_type)
            .ok_or_else(|| WorkflowError::UnknownNodeType(node_type.to_string()))?;

        factory
            .create()
            .map_err(|e| WorkflowError::Invalid(format!("Failed to create plugin: {}", e)))
    }

    /// Get all registered plugin types, sorted
    pub fn list_node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Get metadata for a plugin type, ports taken from its signature
    pub fn get_metadata(&self, node_type: &str) -> Option<PluginMetadata> {
        let factory = self.factories.get(node_type)?;
        let mut metadata = factory.metadata();
        if metadata.inputs.is_empty() && metadata.outputs.is_empty() {
            match factory.create() {
                Ok(plugin) => {
                    let (inputs, outputs) = PortDefinition::from_signature(&plugin.signature());
                    metadata.inputs = inputs;
                    metadata.outputs = outputs;
                }
                Err(e) => tracing::warn!("Cannot inspect plugin {}: {}", node_type, e),
            }
        }
        Some(metadata)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
