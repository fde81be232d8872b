use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Binding error: {0}")]
    Binding(#[from] BindingError),

    #[error("Graph translation failed: {0}")]
    Translation(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure raised while a node evaluates.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Unknown parameter: {0}")]
    UnknownPort(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Expected {expected} upstream results, received {received}")]
    MissingUpstream { expected: usize, received: usize },

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Cancelled")]
    Cancelled,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindingError {
    #[error("Node not found: {0}")]
    UnknownNode(String),

    #[error("Node '{node}' has no input named '{input}'")]
    UnknownInput { node: String, input: String },

    #[error("Node '{node}' has no output named '{output}'")]
    UnknownOutput { node: String, output: String },

    #[error("Input '{node}.{input}' is already bound to '{bound_to}'")]
    AlreadyBound {
        node: String,
        input: String,
        bound_to: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Invalid workflow: {0}")]
    Invalid(String),

    #[error("Node already exists in workflow: {0}")]
    DuplicateNode(String),

    #[error("Cyclic dependency detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error(transparent)]
    Binding(#[from] BindingError),
}
