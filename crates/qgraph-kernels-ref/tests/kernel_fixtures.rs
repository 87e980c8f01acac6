//! Hand-checked fixtures for each reference kernel, driven end-to-end
//! through a session so the kernels only ever see the context bridge.

use qgraph::{
    Activation, ConstData, Conv2dParams, DType, FullyConnectedParams, MaxPool2dParams, Model,
    NodeDesc, OpKind, OpParams, Padding, QuantParams, Session, Shape, SoftmaxParams, Subgraph,
    TensorDesc, TensorStorage,
};
use qgraph_kernels_ref::reference_registry;

static UNIT_Q: QuantParams = QuantParams::new(&[1.0], &[0]);

const fn arena_t(
    offset: usize,
    dims: &'static [usize],
    bytes: usize,
    quant: &'static QuantParams,
) -> TensorDesc {
    TensorDesc {
        storage: TensorStorage::Arena { offset },
        dtype: DType::I8,
        shape: Shape::new(dims),
        bytes,
        quant: Some(quant),
    }
}

const fn const_i8(
    data: &'static [i8],
    dims: &'static [usize],
    bytes: usize,
    quant: &'static QuantParams,
) -> TensorDesc {
    TensorDesc {
        storage: TensorStorage::Constant(ConstData::I8(data)),
        dtype: DType::I8,
        shape: Shape::new(dims),
        bytes,
        quant: Some(quant),
    }
}

const fn const_i32(
    data: &'static [i32],
    dims: &'static [usize],
    bytes: usize,
    quant: &'static QuantParams,
) -> TensorDesc {
    TensorDesc {
        storage: TensorStorage::Constant(ConstData::I32(data)),
        dtype: DType::I32,
        shape: Shape::new(dims),
        bytes,
        quant: Some(quant),
    }
}

fn run(model: Model, input_bytes: &[u8]) -> Session {
    let mut session = Session::new(model, reference_registry()).expect("model is valid");
    session.init().expect("init succeeds");
    let input = session.input_tensor(0).unwrap();
    session
        .tensor_bytes_mut(&input)
        .unwrap()
        .copy_from_slice(input_bytes);
    session.invoke().expect("invoke succeeds");
    session
}

fn output_bytes(session: &Session) -> Vec<u8> {
    let output = session.output_tensor(0).unwrap();
    session.tensor_bytes(&output).unwrap().to_vec()
}

mod conv {
    use super::*;

    static FILTER: [i8; 2] = [1, 2];
    static BIAS: [i32; 1] = [10];

    static TENSORS: [TensorDesc; 4] = [
        arena_t(0, &[1, 1, 3, 1], 3, &UNIT_Q),
        const_i8(&FILTER, &[1, 1, 2, 1], 2, &UNIT_Q),
        const_i32(&BIAS, &[1], 4, &UNIT_Q),
        arena_t(16, &[1, 1, 3, 1], 3, &UNIT_Q),
    ];

    static NODES: [NodeDesc; 1] = [NodeDesc {
        op: OpKind::Conv2d,
        inputs: &[0, 1, 2],
        outputs: &[3],
        params: OpParams::Conv2d(Conv2dParams {
            padding: Padding::Same,
            stride: [1, 1],
            dilation: [1, 1],
            activation: Activation::None,
        }),
    }];

    static SUBGRAPHS: [Subgraph; 1] = [Subgraph {
        tensor_base: 0,
        tensor_count: 4,
        node_base: 0,
        node_count: 1,
    }];

    fn model(arena_size: usize) -> Model {
        Model {
            tensors: &TENSORS,
            nodes: &NODES,
            subgraphs: &SUBGRAPHS,
            inputs: &[0],
            outputs: &[3],
            arena_size,
        }
    }

    #[test]
    fn same_padding_conv_matches_hand_computation() {
        // x = [1 2 3], w = [1 2], bias 10, unit scales:
        //   y0 = 10 + 1*1 + 2*2 = 15
        //   y1 = 10 + 2*1 + 3*2 = 18
        //   y2 = 10 + 3*1 (right edge padded) = 13
        let session = run(model(64), &[1, 2, 3]);
        assert_eq!(output_bytes(&session), vec![15, 18, 13]);
        assert_eq!(session.scratch_count(), 1);
        assert_eq!(session.overflow_count(), 0);
    }

    #[test]
    fn accumulator_scratch_spills_to_overflow_when_headroom_is_gone() {
        // A 32-byte arena leaves no 16-aligned headroom above the plan's
        // 19-byte high-water mark, so the scratch request takes the heap
        // fallback; results are unchanged.
        let session = run(model(32), &[1, 2, 3]);
        assert_eq!(output_bytes(&session), vec![15, 18, 13]);
        assert_eq!(session.scratch_count(), 1);
        assert_eq!(session.overflow_count(), 1);
    }
}

mod pool {
    use super::*;

    static TENSORS: [TensorDesc; 2] = [
        arena_t(0, &[1, 1, 4, 1], 4, &UNIT_Q),
        arena_t(16, &[1, 1, 2, 1], 2, &UNIT_Q),
    ];

    static NODES: [NodeDesc; 1] = [NodeDesc {
        op: OpKind::MaxPool2d,
        inputs: &[0],
        outputs: &[1],
        params: OpParams::MaxPool2d(MaxPool2dParams {
            padding: Padding::Same,
            stride: [1, 2],
            filter: [1, 2],
            activation: Activation::None,
        }),
    }];

    static SUBGRAPHS: [Subgraph; 1] = [Subgraph {
        tensor_base: 0,
        tensor_count: 2,
        node_base: 0,
        node_count: 1,
    }];

    static MODEL: Model = Model {
        tensors: &TENSORS,
        nodes: &NODES,
        subgraphs: &SUBGRAPHS,
        inputs: &[0],
        outputs: &[1],
        arena_size: 64,
    };

    #[test]
    fn windowed_max_keeps_the_larger_value() {
        // x = [3, -5, 7, 2] in windows of two: [3, 7].
        let session = run(MODEL, &[3, (-5i8) as u8, 7, 2]);
        assert_eq!(output_bytes(&session), vec![3, 7]);
    }
}

mod fully_connected {
    use super::*;

    static WEIGHTS: [i8; 6] = [1, 0, -1, 2, 2, 2];
    static BIAS: [i32; 2] = [1, -1];

    static TENSORS: [TensorDesc; 4] = [
        arena_t(0, &[1, 3], 3, &UNIT_Q),
        const_i8(&WEIGHTS, &[2, 3], 6, &UNIT_Q),
        const_i32(&BIAS, &[2], 8, &UNIT_Q),
        arena_t(16, &[1, 2], 2, &UNIT_Q),
    ];

    static NODES: [NodeDesc; 1] = [NodeDesc {
        op: OpKind::FullyConnected,
        inputs: &[0, 1, 2],
        outputs: &[3],
        params: OpParams::FullyConnected(FullyConnectedParams {
            activation: Activation::None,
        }),
    }];

    static SUBGRAPHS: [Subgraph; 1] = [Subgraph {
        tensor_base: 0,
        tensor_count: 4,
        node_base: 0,
        node_count: 1,
    }];

    static MODEL: Model = Model {
        tensors: &TENSORS,
        nodes: &NODES,
        subgraphs: &SUBGRAPHS,
        inputs: &[0],
        outputs: &[3],
        arena_size: 64,
    };

    #[test]
    fn gemv_with_bias_matches_hand_computation() {
        // x = [1 2 3]:
        //   y0 = 1 + (1*1 + 0*2 + -1*3) = -1
        //   y1 = -1 + (2*1 + 2*2 + 2*3) = 11
        let session = run(MODEL, &[1, 2, 3]);
        assert_eq!(output_bytes(&session), vec![(-1i8) as u8, 11]);
    }
}

mod softmax {
    use super::*;

    static IN_Q: QuantParams = QuantParams::new(&[0.25], &[0]);
    static OUT_Q: QuantParams = QuantParams::new(&[0.003_906_25], &[-128]);

    static TENSORS: [TensorDesc; 2] = [
        arena_t(0, &[1, 4], 4, &IN_Q),
        arena_t(16, &[1, 4], 4, &OUT_Q),
    ];

    static NODES: [NodeDesc; 1] = [NodeDesc {
        op: OpKind::Softmax,
        inputs: &[0],
        outputs: &[1],
        params: OpParams::Softmax(SoftmaxParams { beta: 1.0 }),
    }];

    static SUBGRAPHS: [Subgraph; 1] = [Subgraph {
        tensor_base: 0,
        tensor_count: 2,
        node_base: 0,
        node_count: 1,
    }];

    static MODEL: Model = Model {
        tensors: &TENSORS,
        nodes: &NODES,
        subgraphs: &SUBGRAPHS,
        inputs: &[0],
        outputs: &[1],
        arena_size: 64,
    };

    #[test]
    fn uniform_logits_produce_a_uniform_distribution() {
        let session = run(MODEL, &[0, 0, 0, 0]);
        // Each probability is 0.25, stored as round(0.25 * 256) - 128.
        assert_eq!(output_bytes(&session), vec![(-64i8) as u8; 4]);
    }

    #[test]
    fn peaked_logits_match_hand_computation() {
        // Dequantized logits [1, 0, 0, 0]: softmax = [0.4754, 0.1749, ...].
        let session = run(MODEL, &[4, 0, 0, 0]);
        assert_eq!(
            output_bytes(&session),
            vec![(-6i8) as u8, (-83i8) as u8, (-83i8) as u8, (-83i8) as u8]
        );
    }

    #[test]
    fn quantized_probabilities_sum_to_about_one() {
        let session = run(MODEL, &[7, (-3i8) as u8, 12, 0]);
        let out = output_bytes(&session);
        let total: f32 = out
            .iter()
            .map(|&b| (b as i8 as i32 + 128) as f32 / 256.0)
            .sum();
        assert!(
            (total - 1.0).abs() < 4.0 / 256.0,
            "distribution sums to {total}"
        );
    }
}

mod reshape {
    use super::*;

    static NEW_SHAPE: [i32; 2] = [2, 2];

    static TENSORS: [TensorDesc; 3] = [
        arena_t(0, &[4], 4, &UNIT_Q),
        const_i32(&NEW_SHAPE, &[2], 8, &UNIT_Q),
        arena_t(16, &[2, 2], 4, &UNIT_Q),
    ];

    static NODES: [NodeDesc; 1] = [NodeDesc {
        op: OpKind::Reshape,
        inputs: &[0, 1],
        outputs: &[2],
        params: OpParams::Reshape,
    }];

    static SUBGRAPHS: [Subgraph; 1] = [Subgraph {
        tensor_base: 0,
        tensor_count: 3,
        node_base: 0,
        node_count: 1,
    }];

    static MODEL: Model = Model {
        tensors: &TENSORS,
        nodes: &NODES,
        subgraphs: &SUBGRAPHS,
        inputs: &[0],
        outputs: &[2],
        arena_size: 64,
    };

    #[test]
    fn reshape_copies_bytes_between_spans() {
        let session = run(MODEL, &[5, 6, 7, 8]);
        assert_eq!(output_bytes(&session), vec![5, 6, 7, 8]);
    }

    // In-place reshape: input and output planned onto the same bytes.
    static ALIASED: [TensorDesc; 3] = [
        arena_t(0, &[4], 4, &UNIT_Q),
        const_i32(&NEW_SHAPE, &[2], 8, &UNIT_Q),
        arena_t(0, &[2, 2], 4, &UNIT_Q),
    ];

    static ALIASED_MODEL: Model = Model {
        tensors: &ALIASED,
        nodes: &NODES,
        subgraphs: &SUBGRAPHS,
        inputs: &[0],
        outputs: &[2],
        arena_size: 64,
    };

    #[test]
    fn aliased_reshape_leaves_the_bytes_untouched() {
        let session = run(ALIASED_MODEL, &[9, 10, 11, 12]);
        assert_eq!(output_bytes(&session), vec![9, 10, 11, 12]);
    }
}
