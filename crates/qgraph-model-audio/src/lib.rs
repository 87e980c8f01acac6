//! Compiled model description for a two-class audio classifier.
//!
//! An 11-node single-subgraph network over 50x13 MFCC-style feature frames
//! (reshape, conv, reshape, pool, reshape, conv, reshape, pool, reshape,
//! fully-connected, softmax), fully int8-quantized, executing out of a
//! 2176-byte arena. The tables below are the build step's output;
//! nothing here is parsed or computed at runtime.
//!
//! Intermediate tensors reuse arena offsets across non-overlapping
//! lifetimes: offset 0 alternates between the conv inputs and the pool
//! outputs, and the region at 656 holds first the host input and later the
//! first convolution's output.

use qgraph::{
    Activation, ConstData, Conv2dParams, DType, FullyConnectedParams, MaxPool2dParams, Model,
    NodeDesc, OpKind, OpParams, Padding, QuantParams, Shape, SoftmaxParams, Subgraph, TensorDesc,
    TensorStorage,
};

mod data;

/// Planned arena size, bytes.
pub const ARENA_SIZE: usize = 2176;

/// Number of feature values in one input frame (50 frames x 13 cepstra).
pub const INPUT_LEN: usize = 650;

/// Number of output classes.
pub const CLASSES: usize = 2;

static QUANT_INPUT: QuantParams = QuantParams::new(&[0.047_280_810_773_372_65], &[20]);
static QUANT_CONV1_OUT: QuantParams = QuantParams::new(&[0.047_641_348_093_748_09], &[-128]);
static QUANT_CONV2_OUT: QuantParams = QuantParams::new(&[0.019_832_072_779_536_247], &[-128]);
static QUANT_FC_OUT: QuantParams = QuantParams::new(&[0.051_553_077_995_777_13], &[-3]);
static QUANT_SOFTMAX_OUT: QuantParams = QuantParams::new(&[0.003_906_25], &[-128]);
static QUANT_FC_WEIGHTS: QuantParams = QuantParams::new(&[0.003_235_470_969_229_936_6], &[0]);
static QUANT_FC_BIAS: QuantParams = QuantParams::new(&[6.416_609_539_883_211e-5], &[0]);

static ZEROS_16: [i32; 16] = [0; 16];
static ZEROS_8: [i32; 8] = [0; 8];
static QUANT_CONV2_FILTER: QuantParams = QuantParams::new(&data::CONV2_FILTER_SCALES, &ZEROS_16);
static QUANT_CONV2_BIAS: QuantParams = QuantParams::new(&data::CONV2_BIAS_SCALES, &ZEROS_16);
static QUANT_CONV1_FILTER: QuantParams = QuantParams::new(&data::CONV1_FILTER_SCALES, &ZEROS_8);
static QUANT_CONV1_BIAS: QuantParams = QuantParams::new(&data::CONV1_BIAS_SCALES, &ZEROS_8);

const fn arena(offset: usize, dtype: DType, dims: &'static [usize], bytes: usize) -> TensorDesc {
    TensorDesc {
        storage: TensorStorage::Arena { offset },
        dtype,
        shape: Shape::new(dims),
        bytes,
        quant: None,
    }
}

const fn constant(
    data: ConstData,
    dtype: DType,
    dims: &'static [usize],
    bytes: usize,
) -> TensorDesc {
    TensorDesc {
        storage: TensorStorage::Constant(data),
        dtype,
        shape: Shape::new(dims),
        bytes,
        quant: None,
    }
}

const fn quantized(desc: TensorDesc, quant: &'static QuantParams) -> TensorDesc {
    TensorDesc {
        storage: desc.storage,
        dtype: desc.dtype,
        shape: desc.shape,
        bytes: desc.bytes,
        quant: Some(quant),
    }
}

#[rustfmt::skip]
static TENSORS: [TensorDesc; 23] = [
    // 0: host input frame
    quantized(arena(656, DType::I8, &[1, 650], 650), &QUANT_INPUT),
    // 1..=5: reshape target shapes
    constant(ConstData::I32(&data::RESHAPE_DIMS_CONV1), DType::I32, &[4], 16),
    constant(ConstData::I32(&data::RESHAPE_DIMS_POOL1), DType::I32, &[4], 16),
    constant(ConstData::I32(&data::RESHAPE_DIMS_CONV2), DType::I32, &[4], 16),
    constant(ConstData::I32(&data::RESHAPE_DIMS_POOL2), DType::I32, &[4], 16),
    constant(ConstData::I32(&data::RESHAPE_DIMS_FLATTEN), DType::I32, &[2], 8),
    // 6..=7: fully-connected parameters
    quantized(constant(ConstData::I32(&data::FC_BIAS), DType::I32, &[2], 8), &QUANT_FC_BIAS),
    quantized(constant(ConstData::I8(&data::FC_WEIGHTS), DType::I8, &[2, 208], 416), &QUANT_FC_WEIGHTS),
    // 8..=9: second convolution parameters
    quantized(constant(ConstData::I32(&data::CONV2_BIAS), DType::I32, &[16], 64), &QUANT_CONV2_BIAS),
    quantized(constant(ConstData::I8(&data::CONV2_FILTER), DType::I8, &[16, 1, 3, 8], 384), &QUANT_CONV2_FILTER),
    // 10..=11: first convolution parameters
    quantized(constant(ConstData::I32(&data::CONV1_BIAS), DType::I32, &[8], 32), &QUANT_CONV1_BIAS),
    quantized(constant(ConstData::I8(&data::CONV1_FILTER), DType::I8, &[8, 1, 3, 13], 312), &QUANT_CONV1_FILTER),
    // 12..=22: arena-resident intermediates, offsets alias across lifetimes
    quantized(arena(0, DType::I8, &[1, 1, 50, 13], 650), &QUANT_INPUT),
    quantized(arena(656, DType::I8, &[1, 1, 50, 8], 400), &QUANT_CONV1_OUT),
    quantized(arena(0, DType::I8, &[1, 50, 1, 8], 400), &QUANT_CONV1_OUT),
    quantized(arena(400, DType::I8, &[1, 25, 1, 8], 200), &QUANT_CONV1_OUT),
    quantized(arena(0, DType::I8, &[1, 1, 25, 8], 200), &QUANT_CONV1_OUT),
    quantized(arena(400, DType::I8, &[1, 1, 25, 16], 400), &QUANT_CONV2_OUT),
    quantized(arena(0, DType::I8, &[1, 25, 1, 16], 400), &QUANT_CONV2_OUT),
    quantized(arena(400, DType::I8, &[1, 13, 1, 16], 208), &QUANT_CONV2_OUT),
    quantized(arena(0, DType::I8, &[1, 208], 208), &QUANT_CONV2_OUT),
    quantized(arena(208, DType::I8, &[1, 2], 2), &QUANT_FC_OUT),
    quantized(arena(0, DType::I8, &[1, 2], 2), &QUANT_SOFTMAX_OUT),
];

const CONV: OpParams = OpParams::Conv2d(Conv2dParams {
    padding: Padding::Same,
    stride: [1, 1],
    dilation: [1, 1],
    activation: Activation::Relu,
});

const POOL: OpParams = OpParams::MaxPool2d(MaxPool2dParams {
    padding: Padding::Same,
    stride: [2, 1],
    filter: [2, 1],
    activation: Activation::None,
});

const fn node(
    op: OpKind,
    inputs: &'static [usize],
    outputs: &'static [usize],
    params: OpParams,
) -> NodeDesc {
    NodeDesc {
        op,
        inputs,
        outputs,
        params,
    }
}

#[rustfmt::skip]
static NODES: [NodeDesc; 11] = [
    node(OpKind::Reshape, &[0, 1], &[12], OpParams::Reshape),
    node(OpKind::Conv2d, &[12, 11, 10], &[13], CONV),
    node(OpKind::Reshape, &[13, 2], &[14], OpParams::Reshape),
    node(OpKind::MaxPool2d, &[14], &[15], POOL),
    node(OpKind::Reshape, &[15, 3], &[16], OpParams::Reshape),
    node(OpKind::Conv2d, &[16, 9, 8], &[17], CONV),
    node(OpKind::Reshape, &[17, 4], &[18], OpParams::Reshape),
    node(OpKind::MaxPool2d, &[18], &[19], POOL),
    node(OpKind::Reshape, &[19, 5], &[20], OpParams::Reshape),
    node(OpKind::FullyConnected, &[20, 7, 6], &[21],
        OpParams::FullyConnected(FullyConnectedParams { activation: Activation::None })),
    node(OpKind::Softmax, &[21], &[22], OpParams::Softmax(SoftmaxParams { beta: 1.0 })),
];

static SUBGRAPHS: [Subgraph; 1] = [Subgraph {
    tensor_base: 0,
    tensor_count: 23,
    node_base: 0,
    node_count: 11,
}];

/// The complete compiled model description.
pub static MODEL: Model = Model {
    tensors: &TENSORS,
    nodes: &NODES,
    subgraphs: &SUBGRAPHS,
    inputs: &[0],
    outputs: &[22],
    arena_size: ARENA_SIZE,
};

/// Returns the compiled model description.
pub fn model() -> Model {
    MODEL
}
