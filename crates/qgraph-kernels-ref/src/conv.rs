//! 2-D convolution over NHWC int8 activations with OHWI int8 filters.
//!
//! `prepare` validates the declared geometry, derives the per-channel
//! effective requantization multipliers, and claims an i32 accumulator row
//! from the arena's scratch path; `invoke` is a direct convolution loop.

use qgraph::error::Result;
use qgraph::tensor::view;
use qgraph::{OpContext, OpKernel, OpParams, OpState, ScratchIndex};

use crate::common::{activation_range, axis_geometry, nhwc, requantize, ActRange};

pub struct Conv2dKernel;

#[derive(Default)]
struct ConvState {
    multipliers: Vec<f64>,
    act: ActRange,
    pad: [i64; 2],
    scratch: Option<ScratchIndex>,
}

impl OpKernel for Conv2dKernel {
    fn initialize(&self, _ctx: &mut OpContext<'_>) -> Result<Option<OpState>> {
        Ok(Some(Box::new(ConvState::default())))
    }

    fn prepare(&self, ctx: &mut OpContext<'_>) -> Result<()> {
        let params = match *ctx.params() {
            OpParams::Conv2d(p) => p,
            _ => return Err(ctx.error("unexpected parameter block")),
        };
        let input = ctx.input(0)?;
        let filter = ctx.input(1)?;
        let bias = ctx.input(2)?;
        let output = ctx.output(0)?;

        let Some([_, in_h, in_w, in_c]) = nhwc(&input.shape) else {
            return Err(ctx.error("input must be rank-4 NHWC"));
        };
        let Some([out_c, k_h, k_w, filter_c]) = nhwc(&filter.shape) else {
            return Err(ctx.error("filter must be rank-4 OHWI"));
        };
        let Some([_, out_h, out_w, declared_c]) = nhwc(&output.shape) else {
            return Err(ctx.error("output must be rank-4 NHWC"));
        };
        if filter_c != in_c || declared_c != out_c || bias.shape.num_elements() != out_c {
            return Err(ctx.error("filter, bias, and output channel counts disagree"));
        }
        let (want_h, pad_h) = axis_geometry(params.padding, in_h, k_h, params.dilation[0], params.stride[0]);
        let (want_w, pad_w) = axis_geometry(params.padding, in_w, k_w, params.dilation[1], params.stride[1]);
        if (want_h, want_w) != (out_h, out_w) {
            return Err(ctx.error(format!(
                "declared output {out_h}x{out_w} does not match computed {want_h}x{want_w}"
            )));
        }

        let in_q = input.quant.ok_or_else(|| ctx.error("input is not quantized"))?;
        let w_q = filter.quant.ok_or_else(|| ctx.error("filter is not quantized"))?;
        let out_q = output.quant.ok_or_else(|| ctx.error("output is not quantized"))?;
        if w_q.params.zero_points.iter().any(|&zp| zp != 0) {
            return Err(ctx.error("filter zero points must be zero"));
        }

        let multipliers = (0..out_c)
            .map(|c| {
                let w_scale = w_q.params.scales[c % w_q.params.channels()];
                in_q.scale as f64 * w_scale as f64 / out_q.scale as f64
            })
            .collect();
        let act = activation_range(params.activation, &out_q);
        // Accumulator row, one i32 lane per output channel. Its size depends
        // on the filter tables, so it is claimed here rather than planned.
        let scratch = ctx.request_scratch(out_c * std::mem::size_of::<i32>())?;

        let state = ctx.state_mut::<ConvState>()?;
        *state = ConvState {
            multipliers,
            act,
            pad: [pad_h, pad_w],
            scratch: Some(scratch),
        };
        Ok(())
    }

    fn invoke(&self, ctx: &mut OpContext<'_>) -> Result<()> {
        let params = match *ctx.params() {
            OpParams::Conv2d(p) => p,
            _ => return Err(ctx.error("unexpected parameter block")),
        };
        let in_zp = ctx.input(0)?.quant.map(|q| q.zero_point).unwrap_or(0);
        let out_zp = ctx.output(0)?.quant.map(|q| q.zero_point).unwrap_or(0);
        let input = ctx.input_eval(0)?;
        let filter = ctx.input_eval(1)?;
        let bias = ctx.input_eval(2)?;
        let output = ctx.output_eval(0)?;

        let [batch, in_h, in_w, in_c] = nhwc(&input.shape).expect("validated in prepare");
        let [out_c, k_h, k_w, _] = nhwc(&filter.shape).expect("validated in prepare");
        let [_, out_h, out_w, _] = nhwc(&output.shape).expect("validated in prepare");

        let (multipliers, act, pad, scratch) = {
            let state = ctx.state::<ConvState>()?;
            let scratch = state
                .scratch
                .ok_or_else(|| ctx.error("invoke before prepare"))?;
            (state.multipliers.clone(), state.act, state.pad, scratch)
        };

        let io = ctx.resolve_io(&[input, filter, bias], &[output], Some(scratch))?;
        let x = view::as_i8(io.reads[0]);
        let w = view::as_i8(io.reads[1]);
        let b = view::as_i32(io.reads[2]);
        let mut writes = io.writes;
        let out = view::as_i8_mut(&mut writes[0]);
        let acc = view::as_i32_mut(io.scratch.expect("scratch resolved"));

        let [stride_h, stride_w] = params.stride;
        let [dil_h, dil_w] = params.dilation;
        for n in 0..batch {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    acc.copy_from_slice(b);
                    for ky in 0..k_h {
                        let iy = (oy * stride_h + ky * dil_h) as i64 - pad[0];
                        if iy < 0 || iy >= in_h as i64 {
                            continue;
                        }
                        for kx in 0..k_w {
                            let ix = (ox * stride_w + kx * dil_w) as i64 - pad[1];
                            if ix < 0 || ix >= in_w as i64 {
                                continue;
                            }
                            let x_base = ((n * in_h + iy as usize) * in_w + ix as usize) * in_c;
                            for ic in 0..in_c {
                                let xv = x[x_base + ic] as i32 - in_zp;
                                for (oc, lane) in acc.iter_mut().enumerate() {
                                    let wv = w[((oc * k_h + ky) * k_w + kx) * in_c + ic] as i32;
                                    *lane += xv * wv;
                                }
                            }
                        }
                    }
                    let out_base = ((n * out_h + oy) * out_w + ox) * out_c;
                    for oc in 0..out_c {
                        out[out_base + oc] = requantize(acc[oc], multipliers[oc], out_zp, act);
                    }
                }
            }
        }
        Ok(())
    }
}
