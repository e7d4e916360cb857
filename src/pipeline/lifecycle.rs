use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

/// Load state of the inference engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelState {
    Loading,
    Loaded,
    /// Terminal; carries the message shown to the user.
    Error(String),
}

impl ModelState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ModelState::Loading)
    }

    pub fn status_text(&self) -> String {
        match self {
            ModelState::Loading => "Loading model...".to_string(),
            ModelState::Loaded => "Model ready".to_string(),
            ModelState::Error(reason) => format!("Model unavailable: {reason}"),
        }
    }
}

/// Shared handle over the model state.
///
/// Only the first transition out of `Loading` takes effect; `Loaded` and
/// `Error` are terminal for the lifetime of one engine instance and no retry
/// is attempted.
#[derive(Clone, Debug)]
pub struct ModelLifecycle {
    inner: Arc<LifecycleInner>,
}

#[derive(Debug)]
struct LifecycleInner {
    state: Mutex<ModelState>,
    settled: Condvar,
}

impl Default for ModelLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelLifecycle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LifecycleInner {
                state: Mutex::new(ModelState::Loading),
                settled: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ModelState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ModelState {
        self.lock().clone()
    }

    pub fn is_loaded(&self) -> bool {
        matches!(*self.lock(), ModelState::Loaded)
    }

    /// Returns `false` if the state had already settled.
    pub fn mark_loaded(&self) -> bool {
        self.transition(ModelState::Loaded)
    }

    /// Returns `false` if the state had already settled.
    pub fn mark_failed(&self, reason: impl Into<String>) -> bool {
        self.transition(ModelState::Error(reason.into()))
    }

    fn transition(&self, next: ModelState) -> bool {
        let mut state = self.lock();
        if state.is_terminal() {
            log::warn!(
                "ignoring model state change to {:?}; already {:?}",
                next,
                *state
            );
            return false;
        }
        match &next {
            ModelState::Error(reason) => log::error!("model failed to load: {reason}"),
            _ => log::info!("model state: {:?} -> {:?}", *state, next),
        }
        *state = next;
        self.inner.settled.notify_all();
        true
    }

    /// Blocks until the state leaves `Loading` or `timeout` elapses, and
    /// returns whatever the state is then.
    pub fn wait_settled(&self, timeout: Duration) -> ModelState {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while !state.is_terminal() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            state = match self.inner.settled.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        state.clone()
    }
}
