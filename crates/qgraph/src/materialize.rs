//! On-demand materialization of runtime tensor handles.
//!
//! Handles are plain values recomputed from the constant descriptor tables
//! on every lookup; nothing here borrows the arena. A small fixed-capacity
//! cache keyed by global tensor index bounds the per-node working set, and
//! is cleared before every node runs because the same arena bytes can back
//! different logical tensors across nodes (aliasing by construction).

use crate::arena::{ByteSpan, DataRef};
use crate::error::{Result, RuntimeError};
use crate::model::{Model, TensorStorage};
use crate::tensor::{DType, QuantInfo, Shape};

/// Fully materialized tensor view, including quantization metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TensorHandle {
    pub dtype: DType,
    pub shape: Shape,
    pub bytes: usize,
    pub data: DataRef,
    pub quant: Option<QuantInfo>,
}

/// Lightweight variant used on the invoke fast path, where only shape,
/// dtype, and data location are needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalTensor {
    pub dtype: DType,
    pub shape: Shape,
    pub data: DataRef,
}

/// Builds a full handle for the tensor at `global` index.
pub fn materialize(model: &Model, global: usize, subgraph: usize) -> Result<TensorHandle> {
    let desc = model
        .tensors
        .get(global)
        .ok_or(RuntimeError::TensorIndexOutOfRange {
            index: global,
            subgraph,
        })?;
    let data = match desc.storage {
        TensorStorage::Constant(block) => DataRef::Constant(block.bytes()),
        TensorStorage::Arena { offset } => DataRef::Arena(ByteSpan::new(offset, desc.bytes)),
    };
    Ok(TensorHandle {
        dtype: desc.dtype,
        shape: desc.shape,
        bytes: desc.bytes,
        data,
        quant: desc.quant.map(QuantInfo::from_params),
    })
}

/// Builds the lightweight variant for the tensor at `global` index.
pub fn materialize_eval(model: &Model, global: usize, subgraph: usize) -> Result<EvalTensor> {
    let handle = materialize(model, global, subgraph)?;
    Ok(EvalTensor {
        dtype: handle.dtype,
        shape: handle.shape,
        data: handle.data,
    })
}

/// Fixed-capacity linear table keyed by global tensor index.
///
/// Capacity exhaustion signals a build-time miscalibration of the working
/// set, not a recoverable runtime condition.
pub struct HandleCache<T> {
    entries: Vec<(usize, T)>,
    capacity: usize,
}

impl<T: Copy> HandleCache<T> {
    pub fn new(capacity: usize) -> Self {
        HandleCache {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns the cached handle for `key`, materializing through `build`
    /// on first use.
    pub fn get_or_insert(
        &mut self,
        key: usize,
        build: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        if let Some((_, handle)) = self.entries.iter().find(|(k, _)| *k == key) {
            return Ok(*handle);
        }
        if self.entries.len() >= self.capacity {
            return Err(RuntimeError::HandleCacheFull {
                capacity: self.capacity,
            });
        }
        let handle = build()?;
        self.entries.push((key, handle));
        Ok(handle)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The pair of working-set caches used by the context bridge.
pub struct TensorCaches {
    pub tensors: HandleCache<TensorHandle>,
    pub evals: HandleCache<EvalTensor>,
}

impl TensorCaches {
    pub fn new(tensor_capacity: usize, eval_capacity: usize) -> Self {
        TensorCaches {
            tensors: HandleCache::new(tensor_capacity),
            evals: HandleCache::new(eval_capacity),
        }
    }

    /// Invalidated before every node: handles never outlive one node step.
    pub fn clear(&mut self) {
        self.tensors.clear();
        self.evals.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_hits_do_not_rebuild() {
        let mut cache: HandleCache<usize> = HandleCache::new(2);
        let mut builds = 0;
        for _ in 0..3 {
            let v = cache
                .get_or_insert(7, || {
                    builds += 1;
                    Ok(41 + builds)
                })
                .unwrap();
            assert_eq!(v, 42);
        }
        assert_eq!(builds, 1);
    }

    #[test]
    fn cache_capacity_exhaustion_is_fatal() {
        let mut cache: HandleCache<usize> = HandleCache::new(1);
        cache.get_or_insert(0, || Ok(0)).unwrap();
        let err = cache.get_or_insert(1, || Ok(1)).unwrap_err();
        assert!(matches!(err, RuntimeError::HandleCacheFull { capacity: 1 }));
    }
}
