//! Constant model description: tensor descriptors, nodes, and subgraphs.
//!
//! Everything in this module is built at compile time by a model crate and
//! consumed read-only at runtime; there is no file loading or parsing. All
//! fields borrow `'static` data so a whole model can be a `static` table.

use crate::error::{Result, RuntimeError};
use crate::tensor::{view, DType, QuantParams, Shape};

/// Typed view over a read-only constant data block.
#[derive(Debug, Clone, Copy)]
pub enum ConstData {
    I8(&'static [i8]),
    I32(&'static [i32]),
    F32(&'static [f32]),
}

impl ConstData {
    /// Raw little-endian byte view of the constant block.
    pub fn bytes(self) -> &'static [u8] {
        match self {
            ConstData::I8(v) => view::slice_as_bytes(v),
            ConstData::I32(v) => view::slice_as_bytes(v),
            ConstData::F32(v) => view::slice_as_bytes(v),
        }
    }
}

/// Where a tensor's bytes live.
#[derive(Debug, Clone, Copy)]
pub enum TensorStorage {
    /// Read-only constant baked into the binary (weights, biases, shapes).
    Constant(ConstData),
    /// Arena-resident data at a byte offset planned at build time. Offsets
    /// may alias across tensors whose lifetimes do not overlap.
    Arena { offset: usize },
}

/// Build-time descriptor for one tensor.
#[derive(Debug, Clone, Copy)]
pub struct TensorDesc {
    pub storage: TensorStorage,
    pub dtype: DType,
    pub shape: Shape,
    pub bytes: usize,
    pub quant: Option<&'static QuantParams>,
}

/// The closed set of operator kinds this build dispatches over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Reshape,
    Conv2d,
    MaxPool2d,
    FullyConnected,
    Softmax,
}

impl OpKind {
    pub const COUNT: usize = 5;

    pub const fn index(self) -> usize {
        match self {
            OpKind::Reshape => 0,
            OpKind::Conv2d => 1,
            OpKind::MaxPool2d => 2,
            OpKind::FullyConnected => 3,
            OpKind::Softmax => 4,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            OpKind::Reshape => "reshape",
            OpKind::Conv2d => "conv_2d",
            OpKind::MaxPool2d => "max_pool_2d",
            OpKind::FullyConnected => "fully_connected",
            OpKind::Softmax => "softmax",
        }
    }
}

/// Spatial padding discipline for windowed operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// Output spans `ceil(in / stride)` positions; input is padded as needed.
    Same,
    /// Only fully-covered window positions are produced.
    Valid,
}

/// Activation fused into an operator's output requantization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    None,
    Relu,
}

/// Parameter block for 2-D convolution. Strides and dilations are `[h, w]`.
#[derive(Debug, Clone, Copy)]
pub struct Conv2dParams {
    pub padding: Padding,
    pub stride: [usize; 2],
    pub dilation: [usize; 2],
    pub activation: Activation,
}

/// Parameter block for max pooling. Stride and filter are `[h, w]`.
#[derive(Debug, Clone, Copy)]
pub struct MaxPool2dParams {
    pub padding: Padding,
    pub stride: [usize; 2],
    pub filter: [usize; 2],
    pub activation: Activation,
}

#[derive(Debug, Clone, Copy)]
pub struct FullyConnectedParams {
    pub activation: Activation,
}

#[derive(Debug, Clone, Copy)]
pub struct SoftmaxParams {
    pub beta: f32,
}

/// Operator-specific parameter block, tagged by the closed operator set.
#[derive(Debug, Clone, Copy)]
pub enum OpParams {
    Reshape,
    Conv2d(Conv2dParams),
    MaxPool2d(MaxPool2dParams),
    FullyConnected(FullyConnectedParams),
    Softmax(SoftmaxParams),
}

/// One operator invocation in the fixed execution order.
///
/// Input and output entries are tensor indices local to the node's subgraph.
#[derive(Debug, Clone, Copy)]
pub struct NodeDesc {
    pub op: OpKind,
    pub inputs: &'static [usize],
    pub outputs: &'static [usize],
    pub params: OpParams,
}

/// An independently indexed group of nodes and tensors.
#[derive(Debug, Clone, Copy)]
pub struct Subgraph {
    pub tensor_base: usize,
    pub tensor_count: usize,
    pub node_base: usize,
    pub node_count: usize,
}

/// The complete constant model description.
#[derive(Debug, Clone, Copy)]
pub struct Model {
    pub tensors: &'static [TensorDesc],
    pub nodes: &'static [NodeDesc],
    pub subgraphs: &'static [Subgraph],
    /// Global indices of the host-visible input tensors.
    pub inputs: &'static [usize],
    /// Global indices of the host-visible output tensors.
    pub outputs: &'static [usize],
    /// Planned arena size in bytes.
    pub arena_size: usize,
}

impl Model {
    /// Checks the description's internal invariants.
    ///
    /// Run once when a session is created; a failure here is a defect in the
    /// build step that produced the tables, not a runtime condition.
    pub fn validate(&self) -> Result<()> {
        for (index, desc) in self.tensors.iter().enumerate() {
            let expected = desc.shape.num_elements() * desc.dtype.size_in_bytes();
            if desc.bytes != expected {
                return Err(RuntimeError::InvalidModel(format!(
                    "tensor {index}: byte length {} does not match shape {:?} x dtype width",
                    desc.bytes,
                    desc.shape.dims()
                )));
            }
            match desc.storage {
                TensorStorage::Constant(data) => {
                    if data.bytes().len() != desc.bytes {
                        return Err(RuntimeError::InvalidModel(format!(
                            "tensor {index}: constant block holds {} bytes, descriptor claims {}",
                            data.bytes().len(),
                            desc.bytes
                        )));
                    }
                }
                TensorStorage::Arena { offset } => {
                    if offset + desc.bytes > self.arena_size {
                        return Err(RuntimeError::InvalidModel(format!(
                            "tensor {index}: arena span {}..{} exceeds arena size {}",
                            offset,
                            offset + desc.bytes,
                            self.arena_size
                        )));
                    }
                }
            }
            if let Some(quant) = desc.quant {
                if quant.scales.is_empty() || quant.scales.len() != quant.zero_points.len() {
                    return Err(RuntimeError::InvalidModel(format!(
                        "tensor {index}: quantization arrays are empty or mismatched"
                    )));
                }
            }
        }

        for (gi, subgraph) in self.subgraphs.iter().enumerate() {
            if subgraph.tensor_base + subgraph.tensor_count > self.tensors.len()
                || subgraph.node_base + subgraph.node_count > self.nodes.len()
            {
                return Err(RuntimeError::InvalidModel(format!(
                    "subgraph {gi}: tensor or node range exceeds the model tables"
                )));
            }
            let nodes = &self.nodes[subgraph.node_base..subgraph.node_base + subgraph.node_count];
            for (ni, node) in nodes.iter().enumerate() {
                for &local in node.inputs.iter().chain(node.outputs.iter()) {
                    if local >= subgraph.tensor_count {
                        return Err(RuntimeError::InvalidModel(format!(
                            "subgraph {gi} node {ni}: tensor index {local} out of range"
                        )));
                    }
                }
            }
        }

        for &index in self.inputs.iter().chain(self.outputs.iter()) {
            if index >= self.tensors.len() {
                return Err(RuntimeError::InvalidModel(format!(
                    "host tensor index {index} out of range"
                )));
            }
        }

        Ok(())
    }
}
