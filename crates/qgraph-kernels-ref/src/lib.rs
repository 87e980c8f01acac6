//! Portable reference kernels for the `qgraph` operator set.
//!
//! Deterministic, dependency-free int8 implementations of the five operator
//! kinds a compiled graph can reference. Kernels interact with the runtime
//! exclusively through the [`OpContext`](qgraph::OpContext) capability
//! object and are registered via [`reference_registry`].

use std::sync::Arc;

use qgraph::{OpKind, OpRegistry};

mod common;
mod conv;
mod fully_connected;
mod pooling;
mod reshape;
mod softmax;

pub use conv::Conv2dKernel;
pub use fully_connected::FullyConnectedKernel;
pub use pooling::MaxPool2dKernel;
pub use reshape::ReshapeKernel;
pub use softmax::SoftmaxKernel;

/// Builds a registry with every reference kernel installed.
pub fn reference_registry() -> OpRegistry {
    let mut registry = OpRegistry::new();
    registry.register(OpKind::Reshape, Arc::new(ReshapeKernel));
    registry.register(OpKind::Conv2d, Arc::new(Conv2dKernel));
    registry.register(OpKind::MaxPool2d, Arc::new(MaxPool2dKernel));
    registry.register(OpKind::FullyConnected, Arc::new(FullyConnectedKernel));
    registry.register(OpKind::Softmax, Arc::new(SoftmaxKernel));
    registry
}
