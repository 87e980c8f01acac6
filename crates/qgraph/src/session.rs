//! The inference session: lifecycle orchestration over one model instance.
//!
//! A [`Session`] owns every piece of mutable runtime state: the arena, the
//! handle caches, and the per-node lifecycle records. Concurrent model
//! instances are simply independent sessions; the graph itself is immutable
//! and shared.
//!
//! Lifecycle: `init` establishes the arena layout and runs each node's
//! `initialize` and `prepare` exactly once; `invoke` runs every node's
//! `invoke` in fixed array order, once per inference; `reset` releases the
//! slot tables and returns the session to its pre-init state. The sequence
//! `reset` then `init` is repeatable indefinitely.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::arena::{AlignedBuf, ArenaAllocator, DataRef};
use crate::context::OpContext;
use crate::diag::{render_tensor, DiagnosticSink};
use crate::env;
use crate::error::{Result, RuntimeError};
use crate::materialize::{self, TensorCaches, TensorHandle};
use crate::model::Model;
use crate::registry::{OpRegistry, OpState};

/// Per-node lifecycle phase, enforced by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePhase {
    Uninitialized,
    Initialized,
    Prepared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionPhase {
    /// Before `init`, or after `reset`.
    Created,
    /// `init` completed; `invoke` is permitted.
    Ready,
    /// `init` failed; the host must `reset` before trying again.
    Failed,
}

/// Capacity constants and toggles for one session.
///
/// The defaults match the compiled plan this runtime ships with; a model
/// compiled against different limits overrides them here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Live full-handle cache entries per node step.
    pub tensor_handle_capacity: usize,
    /// Live lightweight-handle cache entries per node step.
    pub eval_handle_capacity: usize,
    /// Scratch-buffer slot table size.
    pub scratch_slot_capacity: usize,
    /// Heap-overflow allocation table size.
    pub overflow_slot_capacity: usize,
    /// Arena size override; `None` uses the model's planned size.
    pub arena_capacity: Option<usize>,
    /// Dump every node's input/output tensors to the diagnostic sink.
    pub dump_node_tensors: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            tensor_handle_capacity: 4,
            eval_handle_capacity: 4,
            scratch_slot_capacity: 4,
            overflow_slot_capacity: 10,
            arena_capacity: None,
            dump_node_tensors: env::dump_tensors_enabled(),
        }
    }
}

struct NodeRuntime {
    phase: NodePhase,
    state: Option<OpState>,
}

/// One executable instance of a compiled model.
pub struct Session {
    model: Model,
    registry: OpRegistry,
    config: SessionConfig,
    arena: ArenaAllocator,
    caches: TensorCaches,
    nodes: Vec<NodeRuntime>,
    phase: SessionPhase,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl Session {
    /// Creates a session with default capacities and a runtime-owned arena.
    pub fn new(model: Model, registry: OpRegistry) -> Result<Self> {
        Self::with_config(model, registry, SessionConfig::default())
    }

    /// Creates a session with explicit capacities.
    pub fn with_config(model: Model, registry: OpRegistry, config: SessionConfig) -> Result<Self> {
        let capacity = config.arena_capacity.unwrap_or(model.arena_size);
        Self::with_arena(model, registry, config, AlignedBuf::new(capacity))
    }

    /// Creates a session over a host-provided arena buffer.
    pub fn with_arena(
        model: Model,
        registry: OpRegistry,
        config: SessionConfig,
        arena: AlignedBuf,
    ) -> Result<Self> {
        model.validate()?;
        let arena = ArenaAllocator::new(
            arena,
            config.scratch_slot_capacity,
            config.overflow_slot_capacity,
        );
        let caches = TensorCaches::new(config.tensor_handle_capacity, config.eval_handle_capacity);
        let nodes = model
            .nodes
            .iter()
            .map(|_| NodeRuntime {
                phase: NodePhase::Uninitialized,
                state: None,
            })
            .collect();
        Ok(Session {
            model,
            registry,
            config,
            arena,
            caches,
            nodes,
            phase: SessionPhase::Created,
            sink: None,
        })
    }

    /// Installs a diagnostic sink for fatal errors and verbose dumps.
    pub fn set_sink(&mut self, sink: Arc<dyn DiagnosticSink>) {
        self.sink = Some(sink);
    }

    /// Reports a fatal error to the sink and poisons the session.
    fn fail(&mut self, err: RuntimeError) -> RuntimeError {
        if let Some(sink) = &self.sink {
            sink.fatal(&err.to_string());
        }
        self.phase = SessionPhase::Failed;
        err
    }

    /// Configures the arena, verifies the static plan fits, and runs each
    /// node's `initialize` then `prepare` once, in array order per subgraph.
    ///
    /// The arena boundary check happens before any node lifecycle call, so
    /// a failed `init` performs no partial node initialization.
    pub fn init(&mut self) -> Result<()> {
        self.phase = SessionPhase::Created;
        self.caches.clear();
        for node in &mut self.nodes {
            node.phase = NodePhase::Uninitialized;
            node.state = None;
        }
        self.arena.reset_slots();

        // The high-water mark is the maximum end offset across every
        // arena-resident tensor, not the sum: tensors alias by design.
        let mut boundary = 0usize;
        for global in 0..self.model.tensors.len() {
            let handle = materialize::materialize(&self.model, global, 0)?;
            if let DataRef::Arena(span) = handle.data {
                boundary = boundary.max(span.end());
            }
        }
        if let Err(err) = self.arena.begin(boundary) {
            return Err(self.fail(err));
        }

        for sgi in 0..self.model.subgraphs.len() {
            let subgraph = self.model.subgraphs[sgi];
            for ni in subgraph.node_base..subgraph.node_base + subgraph.node_count {
                match self.run_initialize(sgi, ni) {
                    Ok(()) => self.nodes[ni].phase = NodePhase::Initialized,
                    Err(err) => return Err(self.fail(err)),
                }
            }
        }

        for sgi in 0..self.model.subgraphs.len() {
            let subgraph = self.model.subgraphs[sgi];
            for ni in subgraph.node_base..subgraph.node_base + subgraph.node_count {
                // Prepare may materialize tensors to determine shapes, so
                // the working-set caches are reset for every node.
                self.caches.clear();
                match self.run_prepare(sgi, ni) {
                    Ok(()) => self.nodes[ni].phase = NodePhase::Prepared,
                    Err(err) => return Err(self.fail(err)),
                }
            }
        }

        self.phase = SessionPhase::Ready;
        Ok(())
    }

    fn run_initialize(&mut self, sgi: usize, ni: usize) -> Result<()> {
        let node: &'static _ = &self.model.nodes[ni];
        self.expect_phase(ni, NodePhase::Uninitialized, "initialize")?;
        let kernel = self.registry.kernel(node.op)?;
        let subgraph = self.model.subgraphs[sgi];
        let runtime = &mut self.nodes[ni];
        let mut ctx = OpContext::new(
            self.model,
            subgraph,
            sgi,
            node,
            ni,
            &mut self.arena,
            &mut self.caches,
            &mut runtime.state,
        );
        let state = kernel.initialize(&mut ctx)?;
        self.nodes[ni].state = state;
        Ok(())
    }

    fn run_prepare(&mut self, sgi: usize, ni: usize) -> Result<()> {
        let node: &'static _ = &self.model.nodes[ni];
        self.expect_phase(ni, NodePhase::Initialized, "prepare")?;
        let kernel = self.registry.kernel(node.op)?;
        let subgraph = self.model.subgraphs[sgi];
        let runtime = &mut self.nodes[ni];
        let mut ctx = OpContext::new(
            self.model,
            subgraph,
            sgi,
            node,
            ni,
            &mut self.arena,
            &mut self.caches,
            &mut runtime.state,
        );
        kernel.prepare(&mut ctx)
    }

    fn expect_phase(&self, ni: usize, expected: NodePhase, call: &'static str) -> Result<()> {
        let phase = self.nodes[ni].phase;
        if phase != expected {
            return Err(RuntimeError::InvalidPhase {
                node: ni,
                op: self.model.nodes[ni].op.name(),
                call,
                phase,
            });
        }
        Ok(())
    }

    /// Runs one inference: every node's `invoke`, in fixed order, failing
    /// fast on the first non-success status. Once a node fails, downstream
    /// results, including the output tensor, are undefined.
    pub fn invoke(&mut self) -> Result<()> {
        match self.phase {
            SessionPhase::Ready => {}
            SessionPhase::Created => {
                return Err(RuntimeError::NotInitialized {
                    reason: "init has not run",
                })
            }
            SessionPhase::Failed => {
                return Err(RuntimeError::NotInitialized {
                    reason: "init failed; reset before retrying",
                })
            }
        }

        for sgi in 0..self.model.subgraphs.len() {
            let subgraph = self.model.subgraphs[sgi];
            for ni in subgraph.node_base..subgraph.node_base + subgraph.node_count {
                let node: &'static _ = &self.model.nodes[ni];
                self.expect_phase(ni, NodePhase::Prepared, "invoke")?;
                let kernel = self.registry.kernel(node.op)?;
                // Handles are only valid within one node step: the same
                // global index can denote different logical tensors once
                // arena offsets are reused across nodes.
                self.caches.clear();
                let runtime = &mut self.nodes[ni];
                let mut ctx = OpContext::new(
                    self.model,
                    subgraph,
                    sgi,
                    node,
                    ni,
                    &mut self.arena,
                    &mut self.caches,
                    &mut runtime.state,
                );
                kernel.invoke(&mut ctx)?;
                if self.config.dump_node_tensors {
                    self.dump_node(sgi, ni)?;
                }
            }
        }
        Ok(())
    }

    fn dump_node(&self, sgi: usize, ni: usize) -> Result<()> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        let subgraph = self.model.subgraphs[sgi];
        let node = &self.model.nodes[ni];
        for (role, table) in [("input", node.inputs), ("output", node.outputs)] {
            for (slot, &local) in table.iter().enumerate() {
                let eval =
                    materialize::materialize_eval(&self.model, subgraph.tensor_base + local, sgi)?;
                let bytes = self.arena.data_bytes(eval.data)?;
                sink.node_tensor(ni, role, slot, &render_tensor(&eval, bytes));
            }
        }
        Ok(())
    }

    /// Releases the slot tables and returns every node to its
    /// uninitialized phase. The arena backing stays allocated; the next
    /// `init` re-zeroes it. Scratch slots are counters into reusable arena
    /// offsets, so only the count is dropped; overflow allocations are
    /// heap-backed and are freed here.
    pub fn reset(&mut self) {
        self.arena.reset_slots();
        self.caches.clear();
        for node in &mut self.nodes {
            node.phase = NodePhase::Uninitialized;
            node.state = None;
        }
        self.phase = SessionPhase::Created;
    }

    /// Materializes the host-visible input tensor at `index`.
    pub fn input_tensor(&self, index: usize) -> Result<TensorHandle> {
        let global = *self
            .model
            .inputs
            .get(index)
            .ok_or(RuntimeError::TensorIndexOutOfRange { index, subgraph: 0 })?;
        materialize::materialize(&self.model, global, 0)
    }

    /// Materializes the host-visible output tensor at `index`.
    pub fn output_tensor(&self, index: usize) -> Result<TensorHandle> {
        let global = *self
            .model
            .outputs
            .get(index)
            .ok_or(RuntimeError::TensorIndexOutOfRange { index, subgraph: 0 })?;
        materialize::materialize(&self.model, global, 0)
    }

    /// Read-only bytes of a materialized tensor.
    pub fn tensor_bytes(&self, handle: &TensorHandle) -> Result<&[u8]> {
        self.arena.data_bytes(handle.data)
    }

    /// Mutable bytes of an arena-resident tensor (e.g. to fill an input).
    pub fn tensor_bytes_mut(&mut self, handle: &TensorHandle) -> Result<&mut [u8]> {
        match handle.data {
            DataRef::Arena(span) => self.arena.bytes_mut(span),
            DataRef::Constant(_) => Err(RuntimeError::WriteToConstant),
        }
    }

    /// Whether `init` has completed successfully since the last `reset`.
    pub fn is_ready(&self) -> bool {
        self.phase == SessionPhase::Ready
    }

    /// Number of scratch slots currently recorded.
    pub fn scratch_count(&self) -> usize {
        self.arena.scratch_count()
    }

    /// Number of live heap-overflow allocations.
    pub fn overflow_count(&self) -> usize {
        self.arena.overflow_count()
    }

    /// Total arena capacity in bytes.
    pub fn arena_capacity(&self) -> usize {
        self.arena.capacity()
    }
}
