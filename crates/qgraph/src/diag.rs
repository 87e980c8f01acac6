//! Optional diagnostics channel for fatal errors and per-node dumps.
//!
//! Not part of the functional contract: sessions run identically with no
//! sink installed. Fatal allocation and capacity errors are reported here
//! before they propagate, and when verbose dumps are enabled each node's
//! input and output tensors are handed to the sink after it runs.

use crate::materialize::EvalTensor;
use crate::tensor::{view, DType};

/// Receiver for runtime diagnostics.
pub trait DiagnosticSink: Send + Sync {
    /// Called once for every fatal configuration or allocation error.
    fn fatal(&self, message: &str);

    /// Called per node tensor when verbose dumps are enabled.
    fn node_tensor(&self, node: usize, role: &'static str, slot: usize, rendered: &str) {
        let _ = (node, role, slot, rendered);
    }
}

/// Sink that writes to standard error, the default diagnostic channel.
#[derive(Debug, Default)]
pub struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn fatal(&self, message: &str) {
        eprintln!("ERR: {message}");
    }

    fn node_tensor(&self, node: usize, role: &'static str, slot: usize, rendered: &str) {
        eprintln!("node {node} {role} {slot}: {rendered}");
    }
}

/// Renders a tensor's elements for a verbose dump.
pub(crate) fn render_tensor(tensor: &EvalTensor, bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    let _ = write!(out, "{:?} {:?} [", tensor.dtype, tensor.shape.dims());
    match tensor.dtype {
        DType::I8 => {
            for (i, v) in view::as_i8(bytes).iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                let _ = write!(out, "{v}");
            }
        }
        DType::I32 => {
            for (i, v) in view::as_i32(bytes).iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                let _ = write!(out, "{v}");
            }
        }
        DType::F32 => {
            for (i, v) in view::as_f32(bytes).iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                let _ = write!(out, "{v}");
            }
        }
    }
    out.push(']');
    out
}
