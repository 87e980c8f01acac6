//! Max pooling over NHWC int8 activations.
//!
//! Pooling never requantizes: input and output must share one quantization,
//! checked in `prepare`. The fused activation clamp is precomputed there.

use qgraph::error::Result;
use qgraph::tensor::view;
use qgraph::{OpContext, OpKernel, OpParams, OpState};

use crate::common::{activation_range, axis_geometry, nhwc, ActRange};

pub struct MaxPool2dKernel;

#[derive(Default)]
struct PoolState {
    act: ActRange,
    pad: [i64; 2],
}

impl OpKernel for MaxPool2dKernel {
    fn initialize(&self, _ctx: &mut OpContext<'_>) -> Result<Option<OpState>> {
        Ok(Some(Box::new(PoolState::default())))
    }

    fn prepare(&self, ctx: &mut OpContext<'_>) -> Result<()> {
        let params = match *ctx.params() {
            OpParams::MaxPool2d(p) => p,
            _ => return Err(ctx.error("unexpected parameter block")),
        };
        let input = ctx.input(0)?;
        let output = ctx.output(0)?;
        let Some([_, in_h, in_w, in_c]) = nhwc(&input.shape) else {
            return Err(ctx.error("input must be rank-4 NHWC"));
        };
        let Some([_, out_h, out_w, out_c]) = nhwc(&output.shape) else {
            return Err(ctx.error("output must be rank-4 NHWC"));
        };
        if in_c != out_c {
            return Err(ctx.error("pooling cannot change the channel count"));
        }
        let (want_h, pad_h) = axis_geometry(params.padding, in_h, params.filter[0], 1, params.stride[0]);
        let (want_w, pad_w) = axis_geometry(params.padding, in_w, params.filter[1], 1, params.stride[1]);
        if (want_h, want_w) != (out_h, out_w) {
            return Err(ctx.error(format!(
                "declared output {out_h}x{out_w} does not match computed {want_h}x{want_w}"
            )));
        }
        if input.quant.map(|q| (q.scale, q.zero_point)) != output.quant.map(|q| (q.scale, q.zero_point)) {
            return Err(ctx.error("max pooling requires identical input and output quantization"));
        }
        let act = output
            .quant
            .map(|q| activation_range(params.activation, &q))
            .unwrap_or_default();

        let state = ctx.state_mut::<PoolState>()?;
        *state = PoolState {
            act,
            pad: [pad_h, pad_w],
        };
        Ok(())
    }

    fn invoke(&self, ctx: &mut OpContext<'_>) -> Result<()> {
        let params = match *ctx.params() {
            OpParams::MaxPool2d(p) => p,
            _ => return Err(ctx.error("unexpected parameter block")),
        };
        let input = ctx.input_eval(0)?;
        let output = ctx.output_eval(0)?;
        let [batch, in_h, in_w, channels] = nhwc(&input.shape).expect("validated in prepare");
        let [_, out_h, out_w, _] = nhwc(&output.shape).expect("validated in prepare");
        let (act, pad) = {
            let state = ctx.state::<PoolState>()?;
            (state.act, state.pad)
        };

        let io = ctx.resolve_io(&[input], &[output], None)?;
        let x = view::as_i8(io.reads[0]);
        let mut writes = io.writes;
        let out = view::as_i8_mut(&mut writes[0]);

        for n in 0..batch {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    for c in 0..channels {
                        let mut best = i8::MIN;
                        for fy in 0..params.filter[0] {
                            let iy = (oy * params.stride[0] + fy) as i64 - pad[0];
                            if iy < 0 || iy >= in_h as i64 {
                                continue;
                            }
                            for fx in 0..params.filter[1] {
                                let ix = (ox * params.stride[1] + fx) as i64 - pad[1];
                                if ix < 0 || ix >= in_w as i64 {
                                    continue;
                                }
                                let v = x[((n * in_h + iy as usize) * in_w + ix as usize)
                                    * channels
                                    + c];
                                best = best.max(v);
                            }
                        }
                        let clamped = (best as i32).clamp(act.min, act.max) as i8;
                        out[((n * out_h + oy) * out_w + ox) * channels + c] = clamped;
                    }
                }
            }
        }
        Ok(())
    }
}
