//! Periodic capture with single-flight backpressure.
//!
//! A tick starts a cycle only when the model is loaded and no other cycle is
//! capturing or processing. Ticks that arrive while busy are dropped, never
//! queued. The busy flag is held by a [`BusyGuard`] that travels with the
//! captured frame to the inference worker and is released when it drops,
//! whichever way the cycle ends.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU8, AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender, TrySendError, select};

use super::{
    camera::{Camera, PermissionStatus},
    lifecycle::ModelLifecycle,
};
use crate::{error::PipelineError, types::Frame};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerPhase {
    Idle = 0,
    Capturing = 1,
    Processing = 2,
}

impl SchedulerPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SchedulerPhase::Capturing,
            2 => SchedulerPhase::Processing,
            _ => SchedulerPhase::Idle,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame was captured and handed to the worker.
    Started,
    /// Model is still loading or failed to load.
    ModelNotReady,
    /// Previous cycle still running; this tick is dropped.
    Busy,
    /// Camera had no frame; the cycle ended without processing.
    CaptureFailed,
    /// The inference worker has exited.
    WorkerGone,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub ticks_model_not_ready: u64,
    pub ticks_dropped_busy: u64,
    pub capture_failures: u64,
    pub cycles_started: u64,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
}

#[derive(Debug, Default)]
pub(crate) struct SchedulerShared {
    phase: AtomicU8,
    ticks: AtomicU64,
    ticks_model_not_ready: AtomicU64,
    ticks_dropped_busy: AtomicU64,
    capture_failures: AtomicU64,
    cycles_started: AtomicU64,
    cycles_completed: AtomicU64,
    cycles_failed: AtomicU64,
}

impl SchedulerShared {
    pub(crate) fn phase(&self) -> SchedulerPhase {
        SchedulerPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn record_outcome(&self, success: bool) {
        if success {
            self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            ticks_model_not_ready: self.ticks_model_not_ready.load(Ordering::Relaxed),
            ticks_dropped_busy: self.ticks_dropped_busy.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
        }
    }
}

/// Scoped ownership of the single in-flight cycle. Dropping it returns the
/// scheduler to `Idle`.
#[derive(Debug)]
pub struct BusyGuard {
    shared: Arc<SchedulerShared>,
}

impl BusyGuard {
    fn try_acquire(shared: &Arc<SchedulerShared>) -> Option<Self> {
        shared
            .phase
            .compare_exchange(
                SchedulerPhase::Idle as u8,
                SchedulerPhase::Capturing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| Self {
                shared: shared.clone(),
            })
    }

    fn enter_processing(&self) {
        self.shared
            .phase
            .store(SchedulerPhase::Processing as u8, Ordering::Release);
    }

    pub(crate) fn shared(&self) -> &SchedulerShared {
        &self.shared
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.shared
            .phase
            .store(SchedulerPhase::Idle as u8, Ordering::Release);
    }
}

/// Work handed from the scheduler to the inference worker.
#[derive(Debug)]
pub struct CycleJob {
    pub cycle: u64,
    pub frame: Frame,
    pub guard: BusyGuard,
}

pub struct CaptureScheduler<C> {
    camera: C,
    lifecycle: ModelLifecycle,
    jobs: Sender<CycleJob>,
    shared: Arc<SchedulerShared>,
}

impl<C: Camera> CaptureScheduler<C> {
    pub fn new(camera: C, lifecycle: ModelLifecycle, jobs: Sender<CycleJob>) -> Self {
        Self {
            camera,
            lifecycle,
            jobs,
            shared: Arc::new(SchedulerShared::default()),
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.shared.phase()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared.stats()
    }

    pub(crate) fn shared(&self) -> Arc<SchedulerShared> {
        self.shared.clone()
    }

    pub fn ensure_permission(&mut self) -> Result<(), PipelineError> {
        match self.camera.request_permission() {
            PermissionStatus::Granted => Ok(()),
            PermissionStatus::Denied => {
                log::error!("camera permission denied; capture will not start");
                Err(PipelineError::PermissionDenied)
            }
        }
    }

    /// Handles one timer tick.
    pub fn tick(&mut self) -> TickOutcome {
        let shared = &self.shared;
        shared.ticks.fetch_add(1, Ordering::Relaxed);

        if !self.lifecycle.is_loaded() {
            shared.ticks_model_not_ready.fetch_add(1, Ordering::Relaxed);
            return TickOutcome::ModelNotReady;
        }

        let Some(guard) = BusyGuard::try_acquire(shared) else {
            shared.ticks_dropped_busy.fetch_add(1, Ordering::Relaxed);
            log::debug!("pipeline busy, dropping tick");
            return TickOutcome::Busy;
        };

        let frame = match self.camera.capture_frame() {
            Ok(frame) => frame,
            Err(err) => {
                shared.capture_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("frame capture failed: {err}");
                return TickOutcome::CaptureFailed;
            }
        };

        guard.enter_processing();
        let cycle = shared.cycles_started.fetch_add(1, Ordering::Relaxed) + 1;

        match self.jobs.try_send(CycleJob {
            cycle,
            frame,
            guard,
        }) {
            Ok(()) => TickOutcome::Started,
            Err(TrySendError::Full(_)) => {
                shared.cycles_failed.fetch_add(1, Ordering::Relaxed);
                log::debug!("worker not accepting jobs; cycle {cycle} dropped");
                TickOutcome::Busy
            }
            Err(TrySendError::Disconnected(_)) => {
                shared.cycles_failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("inference worker has exited; cycle {cycle} abandoned");
                TickOutcome::WorkerGone
            }
        }
    }

    /// Drives [`tick`](Self::tick) from `ticker` until `stop` fires or
    /// disconnects.
    pub fn run(mut self, ticker: Receiver<std::time::Instant>, stop: Receiver<()>) {
        loop {
            select! {
                recv(stop) -> _ => break,
                recv(ticker) -> _ => {
                    self.tick();
                }
            }
        }
        log::info!("capture scheduler stopped");
    }

    /// Arms a periodic timer on a dedicated thread.
    pub fn spawn(self, period: Duration) -> Result<SchedulerHandle, PipelineError> {
        let shared = self.shared();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let ticker = crossbeam_channel::tick(period);

        let handle = thread::Builder::new()
            .name("capture-scheduler".into())
            .spawn(move || self.run(ticker, stop_rx))
            .map_err(|err| PipelineError::Spawn("capture scheduler", err))?;

        log::info!("capture scheduler armed with {:?} period", period);
        Ok(SchedulerHandle {
            stop: Some(stop_tx),
            handle: Some(handle),
            shared,
        })
    }
}

/// Disarms the timer when stopped or dropped. An in-flight cycle is left to
/// finish on the worker.
#[derive(Debug)]
pub struct SchedulerHandle {
    stop: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
    shared: Arc<SchedulerShared>,
}

impl SchedulerHandle {
    pub fn phase(&self) -> SchedulerPhase {
        self.shared.phase()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared.stats()
    }

    pub fn stop(mut self) {
        self.disarm();
    }

    pub(crate) fn shared(&self) -> Arc<SchedulerShared> {
        self.shared.clone()
    }

    fn disarm(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::CameraError, pipeline::camera::StillCamera};

    struct BrokenCamera;

    impl Camera for BrokenCamera {
        fn request_permission(&mut self) -> PermissionStatus {
            PermissionStatus::Granted
        }

        fn capture_frame(&mut self) -> Result<Frame, CameraError> {
            Err(CameraError::Unavailable("lens cap on".into()))
        }
    }

    fn still() -> StillCamera {
        StillCamera::from_frames(vec![Frame::rgb(vec![0; 12], 2, 2)])
    }

    #[test]
    fn loading_model_skips_ticks() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut scheduler = CaptureScheduler::new(still(), ModelLifecycle::new(), tx);

        assert_eq!(scheduler.tick(), TickOutcome::ModelNotReady);
        assert!(rx.try_recv().is_err());
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
    }

    #[test]
    fn busy_tick_is_dropped_until_guard_released() {
        let lifecycle = ModelLifecycle::new();
        lifecycle.mark_loaded();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut scheduler = CaptureScheduler::new(still(), lifecycle, tx);

        assert_eq!(scheduler.tick(), TickOutcome::Started);
        assert_eq!(scheduler.phase(), SchedulerPhase::Processing);

        let job = rx.try_recv().unwrap();
        assert_eq!(job.cycle, 1);
        assert_eq!(scheduler.tick(), TickOutcome::Busy);
        assert_eq!(scheduler.tick(), TickOutcome::Busy);

        drop(job);
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
        assert_eq!(scheduler.tick(), TickOutcome::Started);

        let stats = scheduler.stats();
        assert_eq!(stats.ticks, 4);
        assert_eq!(stats.ticks_dropped_busy, 2);
        assert_eq!(stats.cycles_started, 2);
    }

    #[test]
    fn capture_failure_releases_busy_flag() {
        let lifecycle = ModelLifecycle::new();
        lifecycle.mark_loaded();
        let (tx, _rx) = crossbeam_channel::bounded(1);
        let mut scheduler = CaptureScheduler::new(BrokenCamera, lifecycle, tx);

        assert_eq!(scheduler.tick(), TickOutcome::CaptureFailed);
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
        assert_eq!(scheduler.stats().capture_failures, 1);
        assert_eq!(scheduler.stats().cycles_started, 0);
    }

    #[test]
    fn vanished_worker_releases_busy_flag() {
        let lifecycle = ModelLifecycle::new();
        lifecycle.mark_loaded();
        let (tx, rx) = crossbeam_channel::bounded(1);
        drop(rx);
        let mut scheduler = CaptureScheduler::new(still(), lifecycle, tx);

        assert_eq!(scheduler.tick(), TickOutcome::WorkerGone);
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
    }

    #[test]
    fn rejected_hand_off_still_balances_cycle_counts() {
        let lifecycle = ModelLifecycle::new();
        lifecycle.mark_loaded();
        // Rendezvous channel with nobody receiving: every send is refused.
        let (tx, _rx) = crossbeam_channel::bounded(0);
        let mut scheduler = CaptureScheduler::new(still(), lifecycle, tx);

        assert_eq!(scheduler.tick(), TickOutcome::Busy);
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);

        let stats = scheduler.stats();
        assert_eq!(stats.cycles_started, 1);
        assert_eq!(
            stats.cycles_started,
            stats.cycles_completed + stats.cycles_failed
        );
    }

    #[test]
    fn denied_permission_is_reported() {
        let (tx, _rx) = crossbeam_channel::bounded(1);
        let camera = still().with_permission(PermissionStatus::Denied);
        let mut scheduler = CaptureScheduler::new(camera, ModelLifecycle::new(), tx);

        assert!(matches!(
            scheduler.ensure_permission(),
            Err(PipelineError::PermissionDenied)
        ));
    }
}
