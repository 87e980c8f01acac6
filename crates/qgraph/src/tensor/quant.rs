//! Affine quantization metadata attached to tensor descriptors.

/// Per-tensor or per-channel affine quantization tables.
///
/// A length-1 pair of arrays denotes per-tensor quantization; longer arrays
/// carry one `(scale, zero_point)` pair per output channel. Both arrays live
/// in the constant model description.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantParams {
    pub scales: &'static [f32],
    pub zero_points: &'static [i32],
}

impl QuantParams {
    pub const fn new(scales: &'static [f32], zero_points: &'static [i32]) -> Self {
        QuantParams {
            scales,
            zero_points,
        }
    }

    /// Number of quantization channels (1 for per-tensor).
    pub fn channels(&self) -> usize {
        self.scales.len()
    }
}

/// Quantization view carried on a materialized tensor handle.
///
/// The scalar fields are copied from the first channel as a convenience for
/// per-tensor kernels; per-channel kernels reach through `params`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantInfo {
    pub scale: f32,
    pub zero_point: i32,
    pub params: &'static QuantParams,
}

impl QuantInfo {
    pub fn from_params(params: &'static QuantParams) -> Self {
        QuantInfo {
            scale: params.scales[0],
            zero_point: params.zero_points[0],
            params,
        }
    }

    /// Maps a stored integer value back to its real value.
    pub fn dequantize(&self, value: i32) -> f32 {
        (value - self.zero_point) as f32 * self.scale
    }

    /// Maps a real value to the nearest stored integer, without clamping.
    pub fn quantize(&self, value: f32) -> i32 {
        (value / self.scale).round() as i32 + self.zero_point
    }
}
