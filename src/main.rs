use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result, bail};
use signlens::{
    Camera, DetectionService, ModelState, PipelineConfig, SchedulerConfig, StillCamera,
    pipeline::{OrtEngine, recv_latest},
};

const MODEL_LOAD_TIMEOUT: Duration = Duration::from_secs(30);
const STILL_TICK: Duration = Duration::from_millis(250);

const USAGE: &str = "usage: signlens <model.onnx> <image>...\n       signlens <model.onnx> --camera [index]";

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let model_path = args.next().map(PathBuf::from).context(USAGE)?;
    let rest: Vec<String> = args.collect();

    if rest.first().map(String::as_str) == Some("--camera") {
        let index = match rest.get(1) {
            Some(index) => index
                .parse()
                .with_context(|| format!("invalid camera index `{index}`"))?,
            None => 0,
        };
        return run_live(model_path, index);
    }

    let images: Vec<PathBuf> = rest.into_iter().map(PathBuf::from).collect();
    if images.is_empty() {
        bail!("no still captures given\n{USAGE}");
    }
    if let Some(missing) = images.iter().find(|path| !path.is_file()) {
        bail!("still capture {} does not exist", missing.display());
    }

    let cycles = images.len() as u64;
    run(
        StillCamera::from_paths(images),
        model_path,
        SchedulerConfig::default().with_tick_period(STILL_TICK),
        Some(cycles),
    )
}

#[cfg(feature = "camera-nokhwa")]
fn run_live(model_path: PathBuf, index: u32) -> Result<()> {
    use signlens::pipeline::{NokhwaCamera, available_cameras};

    let devices = available_cameras()?;
    for device in &devices {
        println!("camera {}: {}", device.index, device.name);
    }
    let index = nokhwa::utils::CameraIndex::Index(index);
    if !devices.iter().any(|device| device.index == index) {
        bail!("camera {index} not found");
    }

    run(
        NokhwaCamera::new(index),
        model_path,
        SchedulerConfig::default(),
        None,
    )
}

#[cfg(not(feature = "camera-nokhwa"))]
fn run_live(_model_path: PathBuf, _index: u32) -> Result<()> {
    bail!("live capture needs the `camera-nokhwa` feature")
}

/// Runs until `cycle_limit` cycles have been reported, or forever without one.
fn run<C: Camera>(
    camera: C,
    model_path: PathBuf,
    scheduler_config: SchedulerConfig,
    cycle_limit: Option<u64>,
) -> Result<()> {
    let config = PipelineConfig::default();
    let input_size = config.model_input_size;

    let service = DetectionService::start(
        camera,
        move || OrtEngine::new(&model_path, input_size),
        config,
        scheduler_config,
    )?;

    let updates = service.subscribe();
    match service.wait_for_model(MODEL_LOAD_TIMEOUT)? {
        ModelState::Loaded => println!("{}", ModelState::Loaded.status_text()),
        state => bail!("{}", state.status_text()),
    }

    while let Some(snapshot) = recv_latest(&updates) {
        println!(
            "cycle {} ({:.1?}): {} detection(s)",
            snapshot.cycle,
            snapshot.elapsed,
            snapshot.detections.len()
        );
        for det in snapshot.detections.iter() {
            println!(
                "  {:<12} x={:.1} y={:.1} w={:.1} h={:.1}",
                det.display_text(),
                det.x,
                det.y,
                det.width,
                det.height
            );
        }
        if cycle_limit.is_some_and(|limit| snapshot.cycle >= limit) {
            break;
        }
    }

    let stats = service.stop();
    log::info!(
        "{} ticks, {} cycles completed, {} failed, {} dropped while busy",
        stats.ticks,
        stats.cycles_completed,
        stats.cycles_failed,
        stats.ticks_dropped_busy
    );
    Ok(())
}
