//! The capability object handed to operator kernels.
//!
//! Every kernel lifecycle call receives an [`OpContext`] and nothing else.
//! It exposes the capability set kernels need (persistent and scratch
//! memory, tensor lookup, byte resolution, the node's opaque state), so
//! the allocator's internal layout (bump-down zones, aliasing, heap
//! overflow) can change without touching kernel code.

use smallvec::SmallVec;

use crate::arena::{ArenaAllocator, BufferRef, DataRef, IoSpans, ScratchIndex};
use crate::error::{Result, RuntimeError};
use crate::materialize::{self, EvalTensor, TensorCaches, TensorHandle};
use crate::model::{Model, NodeDesc, OpParams, Subgraph};
use crate::registry::OpState;

/// Bridge between one node's kernel and the runtime's mutable state.
pub struct OpContext<'s> {
    model: Model,
    subgraph: Subgraph,
    subgraph_index: usize,
    node: &'static NodeDesc,
    node_index: usize,
    arena: &'s mut ArenaAllocator,
    caches: &'s mut TensorCaches,
    state: &'s mut Option<OpState>,
}

impl<'s> OpContext<'s> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        model: Model,
        subgraph: Subgraph,
        subgraph_index: usize,
        node: &'static NodeDesc,
        node_index: usize,
        arena: &'s mut ArenaAllocator,
        caches: &'s mut TensorCaches,
        state: &'s mut Option<OpState>,
    ) -> Self {
        OpContext {
            model,
            subgraph,
            subgraph_index,
            node,
            node_index,
            arena,
            caches,
            state,
        }
    }

    /// The node currently being initialized, prepared, or invoked.
    pub fn node(&self) -> &'static NodeDesc {
        self.node
    }

    /// The node's operator parameter block.
    pub fn params(&self) -> &'static OpParams {
        &self.node.params
    }

    /// Index of the current node in global execution order.
    pub fn node_index(&self) -> usize {
        self.node_index
    }

    fn global_index(&self, local: usize) -> Result<usize> {
        if local >= self.subgraph.tensor_count {
            return Err(RuntimeError::TensorIndexOutOfRange {
                index: local,
                subgraph: self.subgraph_index,
            });
        }
        Ok(self.subgraph.tensor_base + local)
    }

    /// Materializes the full handle for a subgraph-local tensor index.
    pub fn get_tensor(&mut self, local: usize) -> Result<TensorHandle> {
        let global = self.global_index(local)?;
        let (model, subgraph_index) = (self.model, self.subgraph_index);
        self.caches
            .tensors
            .get_or_insert(global, || materialize::materialize(&model, global, subgraph_index))
    }

    /// Materializes the lightweight handle for a subgraph-local index.
    pub fn get_eval_tensor(&mut self, local: usize) -> Result<EvalTensor> {
        let global = self.global_index(local)?;
        let (model, subgraph_index) = (self.model, self.subgraph_index);
        self.caches
            .evals
            .get_or_insert(global, || {
                materialize::materialize_eval(&model, global, subgraph_index)
            })
    }

    /// Full handle for the node's `i`-th input.
    pub fn input(&mut self, i: usize) -> Result<TensorHandle> {
        let local = self.io_index(self.node.inputs, i, "input")?;
        self.get_tensor(local)
    }

    /// Full handle for the node's `i`-th output.
    pub fn output(&mut self, i: usize) -> Result<TensorHandle> {
        let local = self.io_index(self.node.outputs, i, "output")?;
        self.get_tensor(local)
    }

    /// Lightweight handle for the node's `i`-th input.
    pub fn input_eval(&mut self, i: usize) -> Result<EvalTensor> {
        let local = self.io_index(self.node.inputs, i, "input")?;
        self.get_eval_tensor(local)
    }

    /// Lightweight handle for the node's `i`-th output.
    pub fn output_eval(&mut self, i: usize) -> Result<EvalTensor> {
        let local = self.io_index(self.node.outputs, i, "output")?;
        self.get_eval_tensor(local)
    }

    fn io_index(&self, table: &'static [usize], i: usize, role: &'static str) -> Result<usize> {
        table.get(i).copied().ok_or_else(|| {
            self.error(format!(
                "{role} {i} out of range ({} declared)",
                table.len()
            ))
        })
    }

    /// Allocates a zeroed persistent buffer valid for the whole session.
    pub fn allocate_persistent(&mut self, bytes: usize) -> Result<BufferRef> {
        self.arena.allocate_persistent(bytes)
    }

    /// Registers a runtime-sized scratch buffer. Only meaningful during
    /// `prepare`; the returned index is stable for the session.
    pub fn request_scratch(&mut self, bytes: usize) -> Result<ScratchIndex> {
        self.arena.request_scratch(bytes)
    }

    /// Looks up a scratch buffer registered during `prepare`.
    pub fn get_scratch(&self, index: ScratchIndex) -> Result<BufferRef> {
        self.arena.get_scratch(index)
    }

    /// Read-only bytes of a tensor, wherever they live.
    pub fn read(&self, tensor: &EvalTensor) -> Result<&[u8]> {
        self.arena.data_bytes(tensor.data)
    }

    /// Resolves the byte views for one kernel step: read-only inputs,
    /// mutable outputs, and an optional scratch buffer, all checked for
    /// pairwise disjointness inside the arena.
    pub fn resolve_io(
        &mut self,
        reads: &[EvalTensor],
        writes: &[EvalTensor],
        scratch: Option<ScratchIndex>,
    ) -> Result<IoSpans<'_>> {
        let read_refs: SmallVec<[DataRef; 4]> = reads.iter().map(|t| t.data).collect();
        let mut write_spans = SmallVec::<[_; 4]>::new();
        for tensor in writes {
            match tensor.data {
                DataRef::Arena(span) => write_spans.push(span),
                DataRef::Constant(_) => return Err(RuntimeError::WriteToConstant),
            }
        }
        let scratch = match scratch {
            Some(index) => Some(self.arena.get_scratch(index)?),
            None => None,
        };
        self.arena.resolve(&read_refs, &write_spans, scratch)
    }

    /// Borrows the node's opaque state, downcast to the kernel's type.
    pub fn state<T: 'static>(&self) -> Result<&T> {
        self.state
            .as_ref()
            .and_then(|s| s.downcast_ref::<T>())
            .ok_or(RuntimeError::StateType {
                node: self.node_index,
                op: self.node.op.name(),
            })
    }

    /// Mutably borrows the node's opaque state, downcast to the kernel's type.
    pub fn state_mut<T: 'static>(&mut self) -> Result<&mut T> {
        let (node_index, op) = (self.node_index, self.node.op.name());
        self.state
            .as_mut()
            .and_then(|s| s.downcast_mut::<T>())
            .ok_or(RuntimeError::StateType { node: node_index, op })
    }

    /// Builds a kernel execution error attributed to the current node.
    pub fn error(&self, message: impl Into<String>) -> RuntimeError {
        RuntimeError::kernel(self.node_index, self.node.op.name(), message)
    }
}
