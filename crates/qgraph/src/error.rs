//! Error taxonomy shared by the allocator, materializer, and graph driver.

use thiserror::Error;

use crate::arena::ByteSpan;
use crate::session::NodePhase;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Failures surfaced by the runtime.
///
/// Configuration errors indicate a mismatch between the compiled model plan
/// and the runtime capacity constants; they are detected during `init` or
/// `prepare` and are never retried. Kernel errors are execution failures
/// reported by an operator and abort the remainder of the invoke sequence.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The statically planned tensor data does not fit the arena.
    #[error("tensor arena too small: static plan needs {needed} bytes, arena holds {capacity}")]
    ArenaTooSmall { needed: usize, capacity: usize },

    /// A persistent request missed the arena headroom and the heap-backed
    /// fallback table is already full.
    #[error(
        "failed to allocate persistent buffer of {requested} bytes: \
         does not fit the arena and the overflow table ({capacity} slots) is full"
    )]
    OverflowTableFull { requested: usize, capacity: usize },

    /// More scratch buffers were requested than the slot table can record.
    #[error("failed to allocate scratch buffer of {requested} bytes: slot table ({capacity} slots) is full")]
    ScratchTableFull { requested: usize, capacity: usize },

    /// A scratch slot index that was never handed out by `request_scratch`.
    #[error("scratch slot {index} was never requested")]
    UnknownScratchSlot { index: usize },

    /// More live tensor handles than the fixed working-set cache can hold.
    #[error("tensor handle cache exhausted ({capacity} live entries); the model plan needs a larger working set")]
    HandleCacheFull { capacity: usize },

    /// A tensor index outside the current subgraph's descriptor table.
    #[error("tensor index {index} out of range for subgraph {subgraph}")]
    TensorIndexOutOfRange { index: usize, subgraph: usize },

    /// A byte span that does not lie inside the arena region.
    #[error("byte span at offset {offset} with length {len} exceeds the {capacity}-byte arena")]
    SpanOutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    /// Two spans that must be disjoint alias the same bytes.
    #[error("byte spans {a:?} and {b:?} overlap")]
    SpanOverlap { a: ByteSpan, b: ByteSpan },

    /// An attempt to write through a read-only constant tensor.
    #[error("attempted to write a read-only tensor")]
    WriteToConstant,

    /// No kernel registered for an operator kind the graph uses.
    #[error("no kernel registered for operator {op}")]
    MissingKernel { op: &'static str },

    /// A lifecycle call arrived while the node was in the wrong phase.
    #[error("node {node} ({op}) rejected `{call}` while {phase:?}")]
    InvalidPhase {
        node: usize,
        op: &'static str,
        call: &'static str,
        phase: NodePhase,
    },

    /// `invoke` or an accessor was called on a session that is not ready.
    #[error("session is not initialized: {reason}")]
    NotInitialized { reason: &'static str },

    /// The constant model description violates one of its own invariants.
    #[error("invalid model description: {0}")]
    InvalidModel(String),

    /// The opaque per-node state does not have the type the kernel expects.
    #[error("node {node} ({op}) holds operator state of an unexpected type")]
    StateType { node: usize, op: &'static str },

    /// A kernel reported an execution failure.
    #[error("kernel error at node {node} ({op}): {message}")]
    Kernel {
        node: usize,
        op: &'static str,
        message: String,
    },
}

impl RuntimeError {
    /// Builds a kernel execution error for the given node.
    pub fn kernel(node: usize, op: &'static str, message: impl Into<String>) -> Self {
        RuntimeError::Kernel {
            node,
            op,
            message: message.into(),
        }
    }

    /// Whether this error is a build-time capacity mismatch rather than an
    /// execution failure. Configuration errors are fatal and not retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RuntimeError::ArenaTooSmall { .. }
                | RuntimeError::OverflowTableFull { .. }
                | RuntimeError::ScratchTableFull { .. }
                | RuntimeError::HandleCacheFull { .. }
                | RuntimeError::MissingKernel { .. }
                | RuntimeError::InvalidModel(_)
        )
    }
}
