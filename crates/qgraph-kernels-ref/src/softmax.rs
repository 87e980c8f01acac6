//! Softmax over the last axis of an int8 tensor.
//!
//! Computed by dequantizing through the input scale, exponentiating against
//! the row maximum for stability, and requantizing the normalized
//! probabilities into the declared output quantization. The f32 exponent
//! row lives in a scratch buffer claimed during `prepare`.

use qgraph::error::Result;
use qgraph::tensor::view;
use qgraph::{OpContext, OpKernel, OpParams, OpState, ScratchIndex};

pub struct SoftmaxKernel;

#[derive(Default)]
struct SoftmaxState {
    beta: f32,
    in_scale: f32,
    out_scale: f32,
    out_zp: i32,
    scratch: Option<ScratchIndex>,
}

impl OpKernel for SoftmaxKernel {
    fn initialize(&self, _ctx: &mut OpContext<'_>) -> Result<Option<OpState>> {
        Ok(Some(Box::new(SoftmaxState::default())))
    }

    fn prepare(&self, ctx: &mut OpContext<'_>) -> Result<()> {
        let params = match *ctx.params() {
            OpParams::Softmax(p) => p,
            _ => return Err(ctx.error("unexpected parameter block")),
        };
        let input = ctx.input(0)?;
        let output = ctx.output(0)?;
        if input.shape.dims().last() != output.shape.dims().last()
            || input.shape.num_elements() != output.shape.num_elements()
        {
            return Err(ctx.error("input and output shapes must match"));
        }
        let in_q = input.quant.ok_or_else(|| ctx.error("input is not quantized"))?;
        let out_q = output.quant.ok_or_else(|| ctx.error("output is not quantized"))?;
        let depth = *input
            .shape
            .dims()
            .last()
            .ok_or_else(|| ctx.error("input has no axes"))?;
        let scratch = ctx.request_scratch(depth * std::mem::size_of::<f32>())?;

        let state = ctx.state_mut::<SoftmaxState>()?;
        *state = SoftmaxState {
            beta: params.beta,
            in_scale: in_q.scale,
            out_scale: out_q.scale,
            out_zp: out_q.zero_point,
            scratch: Some(scratch),
        };
        Ok(())
    }

    fn invoke(&self, ctx: &mut OpContext<'_>) -> Result<()> {
        let input = ctx.input_eval(0)?;
        let output = ctx.output_eval(0)?;
        let dims = input.shape.dims();
        let depth = *dims.last().ok_or_else(|| ctx.error("input has no axes"))?;
        let rows = input.shape.num_elements() / depth;
        let (beta, in_scale, out_scale, out_zp, scratch) = {
            let state = ctx.state::<SoftmaxState>()?;
            let scratch = state
                .scratch
                .ok_or_else(|| ctx.error("invoke before prepare"))?;
            (
                state.beta,
                state.in_scale,
                state.out_scale,
                state.out_zp,
                scratch,
            )
        };

        let io = ctx.resolve_io(&[input], &[output], Some(scratch))?;
        let x = view::as_i8(io.reads[0]);
        let mut writes = io.writes;
        let out = view::as_i8_mut(&mut writes[0]);
        let exps = view::as_f32_mut(io.scratch.expect("scratch resolved"));

        for r in 0..rows {
            let row = &x[r * depth..(r + 1) * depth];
            let max = row.iter().copied().max().unwrap_or(0);
            let mut sum = 0f32;
            for (e, &v) in exps.iter_mut().zip(row) {
                *e = (beta * in_scale * (v as i32 - max as i32) as f32).exp();
                sum += *e;
            }
            for (d, &e) in exps.iter().enumerate() {
                let q = (e / sum / out_scale).round() as i32 + out_zp;
                out[r * depth + d] = q.clamp(i8::MIN as i32, i8::MAX as i32) as i8;
            }
        }
        Ok(())
    }
}
