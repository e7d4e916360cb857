use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::types::Detection;

/// Result of one completed capture cycle.
#[derive(Clone, Debug, Default)]
pub struct DetectionSnapshot {
    /// Zero before the first cycle completes.
    pub cycle: u64,
    pub detections: Arc<[Detection]>,
    pub elapsed: Duration,
}

/// Latest detections for the overlay consumer.
///
/// Every publish swaps in a whole new snapshot, so readers never see a list
/// that is half old and half new.
#[derive(Clone, Debug, Default)]
pub struct DetectionFeed {
    inner: Arc<FeedInner>,
}

#[derive(Debug, Default)]
struct FeedInner {
    latest: Mutex<DetectionSnapshot>,
    subscribers: Mutex<Vec<Sender<DetectionSnapshot>>>,
}

impl DetectionFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> DetectionSnapshot {
        self.inner
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Subscribers that fall behind miss snapshots rather than queue them.
    pub fn subscribe(&self) -> Receiver<DetectionSnapshot> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn publish(&self, snapshot: DetectionSnapshot) {
        *self
            .inner
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = snapshot.clone();

        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| !matches!(tx.try_send(snapshot.clone()), Err(TrySendError::Disconnected(_))));
    }
}

/// Blocks for the next message, then drains anything newer.
pub fn recv_latest<T>(rx: &Receiver<T>) -> Option<T> {
    let mut latest = rx.recv().ok()?;
    while let Ok(newer) = rx.try_recv() {
        latest = newer;
    }
    Some(latest)
}
