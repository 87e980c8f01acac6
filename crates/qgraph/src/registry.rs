//! Operator registry: lifecycle dispatch over the closed operator set.

use std::any::Any;
use std::sync::Arc;

use crate::context::OpContext;
use crate::error::{Result, RuntimeError};
use crate::model::OpKind;

/// Opaque per-node state produced by a kernel's `initialize` and consumed
/// by its `prepare` and `invoke` through typed downcasts on the context.
pub type OpState = Box<dyn Any + Send>;

/// Lifecycle interface one operator kernel implements.
///
/// `initialize` runs once per node when the session is initialized and may
/// build opaque state; `prepare` runs once afterwards and may materialize
/// tensors and claim persistent or scratch memory; `invoke` runs once per
/// inference. The default `initialize`/`prepare` are no-ops, mirroring
/// registrations that leave those slots empty.
pub trait OpKernel: Send + Sync {
    fn initialize(&self, _ctx: &mut OpContext<'_>) -> Result<Option<OpState>> {
        Ok(None)
    }

    fn prepare(&self, _ctx: &mut OpContext<'_>) -> Result<()> {
        Ok(())
    }

    fn invoke(&self, ctx: &mut OpContext<'_>) -> Result<()>;
}

/// Fixed mapping from operator kind to its registered kernel.
///
/// The kind set is closed per build, so the table is a plain array rather
/// than an open-ended map; a used kind with no registration is reported at
/// session initialization.
#[derive(Default, Clone)]
pub struct OpRegistry {
    slots: [Option<Arc<dyn OpKernel>>; OpKind::COUNT],
}

impl OpRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs (or replaces) the kernel for `kind`.
    pub fn register(&mut self, kind: OpKind, kernel: Arc<dyn OpKernel>) {
        self.slots[kind.index()] = Some(kernel);
    }

    /// Looks up the kernel for `kind`.
    pub fn kernel(&self, kind: OpKind) -> Result<Arc<dyn OpKernel>> {
        self.slots[kind.index()]
            .clone()
            .ok_or(RuntimeError::MissingKernel { op: kind.name() })
    }
}
