//! One-shot detection over still images, no scheduler involved.
//!
//! cargo run --example detect_images --features backend-ort -- model.onnx a.jpg b.png

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use signlens::{Detector, Frame, PipelineConfig, pipeline::OrtEngine};

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let model_path = args
        .next()
        .map(PathBuf::from)
        .context("usage: detect_images <model.onnx> <image>...")?;
    let image_paths: Vec<PathBuf> = args.map(PathBuf::from).collect();
    if image_paths.is_empty() {
        bail!("no images given");
    }

    let config = PipelineConfig::default();
    let engine = OrtEngine::new(&model_path, config.model_input_size)?;
    let mut detector = Detector::new(engine, config)?;

    println!(
        "Running {} on {} image(s), {:?} output layout",
        model_path.display(),
        image_paths.len(),
        detector.spec().layout
    );

    for path in image_paths {
        let bytes = std::fs::read(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let detections = detector.detect(Frame::encoded(bytes), None)?;

        println!("{}: {} detection(s)", path.display(), detections.len());
        for det in &detections {
            println!(
                "  {:<12} [{:.0}, {:.0}, {:.0}x{:.0}]",
                det.display_text(),
                det.x,
                det.y,
                det.width,
                det.height
            );
        }
    }

    Ok(())
}
