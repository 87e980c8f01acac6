//! Fully-connected layer: int8 matrix-vector product with i32 bias.

use qgraph::error::Result;
use qgraph::tensor::view;
use qgraph::{OpContext, OpKernel, OpParams, OpState};

use crate::common::{activation_range, requantize, ActRange};

pub struct FullyConnectedKernel;

#[derive(Default)]
struct FcState {
    multiplier: f64,
    act: ActRange,
    in_zp: i32,
    out_zp: i32,
}

impl OpKernel for FullyConnectedKernel {
    fn initialize(&self, _ctx: &mut OpContext<'_>) -> Result<Option<OpState>> {
        Ok(Some(Box::new(FcState::default())))
    }

    fn prepare(&self, ctx: &mut OpContext<'_>) -> Result<()> {
        let params = match *ctx.params() {
            OpParams::FullyConnected(p) => p,
            _ => return Err(ctx.error("unexpected parameter block")),
        };
        let input = ctx.input(0)?;
        let weights = ctx.input(1)?;
        let bias = ctx.input(2)?;
        let output = ctx.output(0)?;

        let w_dims = weights.shape.dims();
        if w_dims.len() != 2 {
            return Err(ctx.error("weights must be rank-2 [units, depth]"));
        }
        let (units, depth) = (w_dims[0], w_dims[1]);
        if input.shape.num_elements() % depth != 0 {
            return Err(ctx.error("input element count is not a multiple of the weight depth"));
        }
        let batch = input.shape.num_elements() / depth;
        if bias.shape.num_elements() != units || output.shape.num_elements() != batch * units {
            return Err(ctx.error("bias or output extent does not match the weights"));
        }

        let in_q = input.quant.ok_or_else(|| ctx.error("input is not quantized"))?;
        let w_q = weights.quant.ok_or_else(|| ctx.error("weights are not quantized"))?;
        let out_q = output.quant.ok_or_else(|| ctx.error("output is not quantized"))?;
        if w_q.zero_point != 0 {
            return Err(ctx.error("weight zero point must be zero"));
        }

        let state = ctx.state_mut::<FcState>()?;
        *state = FcState {
            multiplier: in_q.scale as f64 * w_q.scale as f64 / out_q.scale as f64,
            act: activation_range(params.activation, &out_q),
            in_zp: in_q.zero_point,
            out_zp: out_q.zero_point,
        };
        Ok(())
    }

    fn invoke(&self, ctx: &mut OpContext<'_>) -> Result<()> {
        let input = ctx.input_eval(0)?;
        let weights = ctx.input_eval(1)?;
        let bias = ctx.input_eval(2)?;
        let output = ctx.output_eval(0)?;

        let w_dims = weights.shape.dims();
        let (units, depth) = (w_dims[0], w_dims[1]);
        let batch = input.shape.num_elements() / depth;
        let (multiplier, act, in_zp, out_zp) = {
            let state = ctx.state::<FcState>()?;
            (state.multiplier, state.act, state.in_zp, state.out_zp)
        };

        let io = ctx.resolve_io(&[input, weights, bias], &[output], None)?;
        let x = view::as_i8(io.reads[0]);
        let w = view::as_i8(io.reads[1]);
        let b = view::as_i32(io.reads[2]);
        let mut writes = io.writes;
        let out = view::as_i8_mut(&mut writes[0]);

        for n in 0..batch {
            for u in 0..units {
                let mut acc = b[u];
                let row = &w[u * depth..(u + 1) * depth];
                for d in 0..depth {
                    acc += (x[n * depth + d] as i32 - in_zp) * row[d] as i32;
                }
                out[n * units + u] = requantize(acc, multiplier, out_zp, act);
            }
        }
        Ok(())
    }
}
