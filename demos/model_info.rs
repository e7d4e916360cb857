//! Prints the shape contract a model declares and how the decoder will read it.
//!
//! cargo run --example model_info --features backend-ort -- model.onnx [input_size]

use std::path::PathBuf;

use anyhow::{Context, Result};
use signlens::{
    InferenceEngine, PipelineConfig,
    pipeline::{OrtEngine, OutputSpec},
};

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let model_path = args
        .next()
        .map(PathBuf::from)
        .context("usage: model_info <model.onnx> [input_size]")?;
    let mut config = PipelineConfig::default();
    if let Some(size) = args.next() {
        let size = size
            .parse()
            .with_context(|| format!("invalid input size `{size}`"))?;
        config = config.with_input_size(size);
    }

    println!("Loading model: {}", model_path.display());
    let engine = OrtEngine::new(&model_path, config.model_input_size)?;

    println!("Input:  {:?}", engine.input_dims());
    println!("Output: {:?}", engine.output_dims());

    let spec = OutputSpec::from_engine(&engine, config.feature_count());
    println!(
        "Layout: {:?}, {} features x {} predictions",
        spec.layout,
        spec.features,
        if spec.predictions == 0 {
            "symbolic".to_string()
        } else {
            spec.predictions.to_string()
        }
    );

    match config.validate_against(&spec) {
        Ok(()) => println!(
            "Matches the {}-label sign alphabet at {}px",
            config.num_classes(),
            config.model_input_size
        ),
        Err(err) => println!("Does not match default configuration: {err}"),
    }

    Ok(())
}
