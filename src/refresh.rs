use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Single-permit wake-up for the display renderer.
///
/// Any number of `signal()` calls before the renderer wakes collapse into one
/// pending redraw.
#[derive(Debug, Default)]
pub struct RefreshSignal {
    pending: Mutex<bool>,
    wake: Condvar,
}

impl RefreshSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = true;
        self.wake.notify_one();
    }

    pub fn is_pending(&self) -> bool {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until signaled, then consume the permit.
    pub fn wait(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        while !*pending {
            pending = self.wake.wait(pending).unwrap_or_else(PoisonError::into_inner);
        }
        *pending = false;
    }

    /// Like `wait`, but gives up after `timeout`. Returns true when a permit was consumed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut pending, _) = self
            .wake
            .wait_timeout_while(pending, timeout, |pending| !*pending)
            .unwrap_or_else(PoisonError::into_inner);
        let woke = *pending;
        *pending = false;
        woke
    }
}
