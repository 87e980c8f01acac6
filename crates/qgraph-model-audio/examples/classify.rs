use std::sync::Arc;

use anyhow::Result;
use qgraph::{Session, StderrSink};
use qgraph_kernels_ref::reference_registry;
use qgraph_model_audio::{model, INPUT_LEN};

fn main() -> Result<()> {
    let mut session = Session::new(model(), reference_registry())?;
    session.set_sink(Arc::new(StderrSink));
    session.init()?;

    // A synthetic feature frame; a real host would feed MFCC features here.
    let frame: Vec<u8> = (0..INPUT_LEN).map(|i| ((i * 37 + 11) % 256) as u8).collect();
    let input = session.input_tensor(0)?;
    session.tensor_bytes_mut(&input)?.copy_from_slice(&frame);

    session.invoke()?;

    let output = session.output_tensor(0)?;
    let quant = output.quant.expect("output declares quantization");
    for (class, &byte) in session.tensor_bytes(&output)?.iter().enumerate() {
        let probability = quant.dequantize(byte as i8 as i32);
        println!("class {class}: {probability:.4}");
    }

    session.reset();
    Ok(())
}
