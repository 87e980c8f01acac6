//! Minimal runtime for executing a fixed, precompiled quantized inference
//! graph out of a single statically sized tensor arena.
//!
//! A compiled model crate provides constant descriptor tables; an operator
//! kernel library registers lifecycle implementations for the closed set of
//! operator kinds; a [`Session`] ties both to one arena and drives
//! `init` / `invoke` / `reset` with zero heap growth in the common case.

pub mod arena;
pub mod context;
pub mod diag;
mod env;
pub mod error;
pub mod materialize;
pub mod model;
pub mod registry;
pub mod session;
pub mod tensor;

pub use arena::{AlignedBuf, BufferRef, ByteSpan, DataRef, ScratchIndex};
pub use context::OpContext;
pub use diag::{DiagnosticSink, StderrSink};
pub use error::{Result, RuntimeError};
pub use materialize::{EvalTensor, TensorHandle};
pub use model::{
    Activation, ConstData, Conv2dParams, FullyConnectedParams, MaxPool2dParams, Model, NodeDesc,
    OpKind, OpParams, Padding, SoftmaxParams, Subgraph, TensorDesc, TensorStorage,
};
pub use registry::{OpKernel, OpRegistry, OpState};
pub use session::{NodePhase, Session, SessionConfig};
pub use tensor::{DType, QuantInfo, QuantParams, Shape};
