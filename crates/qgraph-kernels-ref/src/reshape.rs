//! Reshape: a byte copy between identically sized views.
//!
//! The optional second input carries the target shape as a constant tensor;
//! the runtime output descriptor already encodes it, so only the data moves.

use qgraph::error::Result;
use qgraph::{OpContext, OpKernel};

pub struct ReshapeKernel;

impl OpKernel for ReshapeKernel {
    fn prepare(&self, ctx: &mut OpContext<'_>) -> Result<()> {
        let input = ctx.input(0)?;
        let output = ctx.output(0)?;
        if input.bytes != output.bytes {
            return Err(ctx.error(format!(
                "cannot reshape {} bytes into {} bytes",
                input.bytes, output.bytes
            )));
        }
        Ok(())
    }

    fn invoke(&self, ctx: &mut OpContext<'_>) -> Result<()> {
        let input = ctx.input_eval(0)?;
        let output = ctx.output_eval(0)?;
        if input.data == output.data {
            // The plan placed input and output on the same bytes.
            return Ok(());
        }
        let mut io = ctx.resolve_io(&[input], &[output], None)?;
        io.writes[0].copy_from_slice(io.reads[0]);
        Ok(())
    }
}
