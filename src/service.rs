use std::{thread, time::Duration};

use crossbeam_channel::Receiver;

use crate::{
    config::{PipelineConfig, SchedulerConfig},
    error::PipelineError,
    pipeline::{
        Camera, CaptureScheduler, DetectionFeed, DetectionSnapshot, InferenceEngine,
        ModelLifecycle, ModelState, SchedulerHandle, SchedulerPhase, SchedulerStats,
        start_worker,
    },
};

/// A running detection pipeline: model worker, capture timer and the
/// snapshot feed between them and the overlay.
///
/// Dropping the service disarms the timer and then waits for the worker to
/// finish whatever cycle it is on.
pub struct DetectionService {
    lifecycle: ModelLifecycle,
    feed: DetectionFeed,
    scheduler: Option<SchedulerHandle>,
    worker: Option<thread::JoinHandle<()>>,
}

impl DetectionService {
    /// Permission is checked before any thread exists; a denied camera
    /// leaves nothing running.
    pub fn start<C, E, L>(
        camera: C,
        loader: L,
        config: PipelineConfig,
        scheduler_config: SchedulerConfig,
    ) -> Result<Self, PipelineError>
    where
        C: Camera,
        E: InferenceEngine,
        L: FnOnce() -> anyhow::Result<E> + Send + 'static,
    {
        config.validate()?;
        scheduler_config.validate()?;

        let lifecycle = ModelLifecycle::new();
        let feed = DetectionFeed::new();
        let (job_tx, job_rx) = crossbeam_channel::bounded(1);

        let mut capture = CaptureScheduler::new(camera, lifecycle.clone(), job_tx);
        capture.ensure_permission()?;

        let worker = start_worker(
            loader,
            config,
            scheduler_config.display,
            lifecycle.clone(),
            feed.clone(),
            job_rx,
        )?;
        let scheduler = capture.spawn(scheduler_config.tick_period)?;

        log::info!(
            "detection service started ({:?} tick)",
            scheduler_config.tick_period
        );

        Ok(Self {
            lifecycle,
            feed,
            scheduler: Some(scheduler),
            worker: Some(worker),
        })
    }

    pub fn model_state(&self) -> ModelState {
        self.lifecycle.state()
    }

    /// Blocks until the model settles. A load failure comes back as
    /// [`PipelineError::ModelLoad`]; a timeout while still loading is not an
    /// error.
    pub fn wait_for_model(&self, timeout: Duration) -> Result<ModelState, PipelineError> {
        match self.lifecycle.wait_settled(timeout) {
            ModelState::Error(reason) => Err(PipelineError::ModelLoad(reason)),
            state => Ok(state),
        }
    }

    pub fn latest(&self) -> DetectionSnapshot {
        self.feed.latest()
    }

    pub fn subscribe(&self) -> Receiver<DetectionSnapshot> {
        self.feed.subscribe()
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.scheduler
            .as_ref()
            .map(SchedulerHandle::phase)
            .unwrap_or(SchedulerPhase::Idle)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.scheduler
            .as_ref()
            .map(SchedulerHandle::stats)
            .unwrap_or_default()
    }

    /// Returns the final counters once both threads are gone.
    pub fn stop(mut self) -> SchedulerStats {
        self.shutdown()
    }

    fn shutdown(&mut self) -> SchedulerStats {
        let shared = self.scheduler.as_ref().map(SchedulerHandle::shared);
        if let Some(scheduler) = self.scheduler.take() {
            // Joining the timer thread drops the job sender, which ends the
            // worker loop once the in-flight cycle is done.
            scheduler.stop();
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("inference worker panicked");
            }
        }
        log::info!("detection service stopped");
        shared.map(|shared| shared.stats()).unwrap_or_default()
    }
}

impl Drop for DetectionService {
    fn drop(&mut self) {
        if self.scheduler.is_some() || self.worker.is_some() {
            self.shutdown();
        }
    }
}
