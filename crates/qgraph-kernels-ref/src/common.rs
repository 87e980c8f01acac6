//! Shared requantization and geometry helpers for the reference kernels.

use qgraph::tensor::Shape;
use qgraph::{Activation, Padding, QuantInfo};

/// Clamp range applied to quantized outputs after requantization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ActRange {
    pub min: i32,
    pub max: i32,
}

impl Default for ActRange {
    fn default() -> Self {
        ActRange {
            min: i8::MIN as i32,
            max: i8::MAX as i32,
        }
    }
}

/// Computes the quantized clamp range for a fused activation.
///
/// ReLU clamps at the output's representation of real zero; the storage
/// type bounds always apply.
pub(crate) fn activation_range(activation: Activation, output: &QuantInfo) -> ActRange {
    let mut range = ActRange::default();
    if activation == Activation::Relu {
        range.min = range.min.max(output.zero_point);
    }
    range
}

/// Scales an i32 accumulator into the output's quantized domain.
pub(crate) fn requantize(acc: i32, multiplier: f64, zero_point: i32, range: ActRange) -> i8 {
    let value = (acc as f64 * multiplier).round() as i32 + zero_point;
    value.clamp(range.min, range.max) as i8
}

/// Interprets a rank-4 shape as NHWC dimensions.
pub(crate) fn nhwc(shape: &Shape) -> Option<[usize; 4]> {
    let dims = shape.dims();
    (dims.len() == 4).then(|| [dims[0], dims[1], dims[2], dims[3]])
}

/// Output extent and leading padding for one spatial axis.
pub(crate) fn axis_geometry(
    padding: Padding,
    input: usize,
    filter: usize,
    dilation: usize,
    stride: usize,
) -> (usize, i64) {
    let effective = (filter - 1) * dilation + 1;
    match padding {
        Padding::Same => {
            let output = input.div_ceil(stride);
            let total = ((output - 1) * stride + effective).saturating_sub(input);
            (output, (total / 2) as i64)
        }
        Padding::Valid => {
            let output = if input >= effective {
                (input - effective) / stride + 1
            } else {
                0
            };
            (output, 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qgraph::QuantParams;

    static OUT_Q: QuantParams = QuantParams::new(&[0.25], &[-10]);

    #[test]
    fn relu_clamps_at_the_output_zero_point() {
        let q = QuantInfo::from_params(&OUT_Q);
        let range = activation_range(Activation::Relu, &q);
        assert_eq!((range.min, range.max), (-10, 127));
        let none = activation_range(Activation::None, &q);
        assert_eq!((none.min, none.max), (-128, 127));
    }

    #[test]
    fn requantize_rounds_and_clamps() {
        let range = ActRange::default();
        assert_eq!(requantize(100, 0.5, 0, range), 50);
        assert_eq!(requantize(100, 0.5, 3, range), 53);
        assert_eq!(requantize(10_000, 0.5, 0, range), 127);
        assert_eq!(requantize(-10_000, 0.5, 0, range), -128);
    }

    #[test]
    fn same_padding_covers_every_stride_position() {
        // 50 wide, 3-tap filter, stride 1: output 50, one leading pad cell.
        assert_eq!(axis_geometry(Padding::Same, 50, 3, 1, 1), (50, 1));
        // 25 high, 2-tap pool, stride 2: output 13, no leading pad.
        assert_eq!(axis_geometry(Padding::Same, 25, 2, 1, 2), (13, 0));
        assert_eq!(axis_geometry(Padding::Valid, 5, 3, 1, 1), (3, 0));
    }
}
