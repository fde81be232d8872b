//! Standard node library
//!
//! Collection of built-in processing plugins: constants, frame streaming,
//! simple image operations, radial integration and debugging helpers.

mod array;
mod debug;
mod frames;
mod image;
mod integrate;
mod source;
mod time;

pub use debug::DebugLogNode;
pub use frames::{AccumulateNode, FrameSourceNode};
pub use image::{ScaleNode, ThresholdNode};
pub use integrate::IntegrateNode;
pub use source::ConstantNode;
pub use time::DelayNode;
use wfruntime::PluginRegistry;

use std::sync::Arc;

/// Register all standard nodes with a registry
pub fn register_all(registry: &mut PluginRegistry) {
    registry.register(Arc::new(source::ConstantNodeFactory));
    registry.register(Arc::new(frames::FrameSourceNodeFactory));
    registry.register(Arc::new(frames::AccumulateNodeFactory));
    registry.register(Arc::new(image::ThresholdNodeFactory));
    registry.register(Arc::new(image::ScaleNodeFactory));
    registry.register(Arc::new(integrate::IntegrateNodeFactory));
    registry.register(Arc::new(time::DelayNodeFactory));
    registry.register(Arc::new(debug::DebugLogNodeFactory));
}

/// Registry preloaded with every standard node
pub fn standard_registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    register_all(&mut registry);
    registry
}
