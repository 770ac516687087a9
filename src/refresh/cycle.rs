use std::sync::{Mutex, MutexGuard, PoisonError};

/// Whether a refresh cycle is in progress.
///
/// Every read and write goes through one mutex. Workers poll
/// [`CycleState::is_active`] between queue waits; clearing the flag is the
/// signal for them to exit.
#[derive(Debug, Default)]
pub struct CycleState {
    active: Mutex<bool>,
}

impl CycleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a cycle as started.
    ///
    /// Returns `false`, leaving the state untouched, if a cycle is already
    /// active.
    pub fn start(&self) -> bool {
        let mut active = self.lock();
        if *active {
            return false;
        }
        *active = true;
        true
    }

    /// Snapshot of the flag. It may change as soon as this returns.
    pub fn is_active(&self) -> bool {
        *self.lock()
    }

    /// Clear the flag unconditionally.
    pub fn stop(&self) {
        *self.lock() = false;
    }

    // A panic while holding the guard cannot leave a bool half-written.
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
