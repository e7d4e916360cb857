use std::{sync::Arc, thread, time::Instant};

use crossbeam_channel::Receiver;

use super::{
    detector::Detector,
    engine::InferenceEngine,
    feed::{DetectionFeed, DetectionSnapshot},
    lifecycle::ModelLifecycle,
    scheduler::CycleJob,
};
use crate::{config::PipelineConfig, error::PipelineError, types::DisplaySize};

fn run_worker_loop<E: InferenceEngine>(
    mut detector: Detector<E>,
    display: Option<DisplaySize>,
    feed: DetectionFeed,
    job_rx: Receiver<CycleJob>,
) {
    while let Ok(job) = job_rx.recv() {
        let CycleJob {
            cycle,
            frame,
            guard,
        } = job;
        let started = Instant::now();

        let (detections, success) = match detector.detect(frame, display) {
            Ok(detections) => (detections, true),
            Err(err) => {
                log::warn!("inference failed on cycle {cycle}: {err:?}");
                (Vec::new(), false)
            }
        };

        feed.publish(DetectionSnapshot {
            cycle,
            detections: Arc::from(detections),
            elapsed: started.elapsed(),
        });
        guard.shared().record_outcome(success);
        // Releasing the guard returns the scheduler to idle.
        drop(guard);
    }
    log::info!("inference worker stopped");
}

/// Loads the engine on a dedicated thread and then serves capture cycles.
///
/// The lifecycle settles exactly once: `Loaded` when both the engine and the
/// detector come up, `Error` otherwise. A failed load ends the thread.
pub fn start_worker<E, L>(
    loader: L,
    config: PipelineConfig,
    display: Option<DisplaySize>,
    lifecycle: ModelLifecycle,
    feed: DetectionFeed,
    job_rx: Receiver<CycleJob>,
) -> Result<thread::JoinHandle<()>, PipelineError>
where
    E: InferenceEngine,
    L: FnOnce() -> anyhow::Result<E> + Send + 'static,
{
    thread::Builder::new()
        .name("inference-worker".into())
        .spawn(move || {
            let engine = match loader() {
                Ok(engine) => engine,
                Err(err) => {
                    lifecycle.mark_failed(format!("{err:#}"));
                    return;
                }
            };

            let detector = match Detector::new(engine, config) {
                Ok(detector) => detector,
                Err(err) => {
                    lifecycle.mark_failed(err.to_string());
                    return;
                }
            };

            lifecycle.mark_loaded();
            run_worker_loop(detector, display, feed, job_rx);
        })
        .map_err(|err| PipelineError::Spawn("inference worker", err))
}
