//! Workflow execution runtime
//!
//! This crate provides the execution backend adapter that turns compiled
//! task graphs into submissions for an execution service, the in-process
//! scheduler used by default, the plugin registry and the runtime facade.

mod channels;
mod config;
mod executor;
mod graph;
mod registry;
mod runtime;
mod scheduler;
mod service;

pub use channels::BindingChannels;
pub use config::{ErrorHandling, RuntimeConfig};
pub use executor::{translate, ExecutionHandle, ExecutionResult, TaskReport, WorkflowExecutor};
pub use graph::TaskDiGraph;
pub use registry::{PluginFactory, PluginMetadata, PluginRegistry, PortDefinition};
pub use runtime::Runtime;
pub use scheduler::LocalScheduler;
pub use service::{
    ExecutionService, ServiceReport, SubmittedTask, Submission, TaskArgs, TaskFn, TaskFuture,
    TaskStatus,
};
