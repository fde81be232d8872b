//! Core abstractions for the processing workflow engine
//!
//! This crate provides parameters and their binding protocol, the plugin
//! trait, the workflow container and the compiler that turns a workflow
//! into a dependency-ordered task graph. It does not execute task graphs;
//! that is the job of `wfruntime`.

mod error;
pub mod events;
mod graph;
mod node;
mod param;
mod process;
mod stream;
mod value;
mod workflow;

pub use error::{BindingError, FlowError, NodeError, WorkflowError};
pub use events::*;
pub use graph::{Task, TaskGraph, TaskId};
pub use node::{NodeContext, ProcessNode, ProcessingPlugin};
pub use param::{Input, NodeKey, Output, Parameters, PortRef, Signature};
pub use process::{ArgBinding, TaskEnv, WorkflowProcess};
pub use stream::StreamPorts;
pub use value::{NdArray, Value, ValueKind};
pub use workflow::{BindingDefinition, NodeDefinition, Workflow, WorkflowDefinition};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
