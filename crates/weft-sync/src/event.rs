use crate::error::SyncError;
use crate::lock::Lock;

/// Latching one-shot event built on a pre-acquired [`Lock`].
///
/// The latch starts unset with the lock held; `set` releases it, `clear`
/// takes it back, and `wait` passes through with an acquire/release pair, so
/// waiting is cheap once the event is set and blocking otherwise. The state
/// machine is strict: setting a set event or clearing an unset one fails, so
/// double-set bugs surface at their source.
#[derive(Debug)]
pub struct Event {
    lock: Lock,
}

impl Event {
    /// Create an unset event.
    pub fn new() -> Self {
        let lock = Lock::new();
        lock.acquire();
        Self { lock }
    }

    /// Latch the event, releasing all waiters. Fails if already set.
    pub fn set(&self) -> Result<(), SyncError> {
        if !self.lock.locked() {
            return Err(SyncError::EventAlreadySet);
        }
        self.lock.release();
        Ok(())
    }

    /// Reset the event to unset. Fails if not currently set.
    pub fn clear(&self) -> Result<(), SyncError> {
        if self.lock.locked() {
            return Err(SyncError::EventNotSet);
        }
        self.lock.acquire();
        Ok(())
    }

    /// Block until the event is set.
    pub fn wait(&self) {
        self.lock.acquire();
        self.lock.release();
    }

    /// Whether the event is currently set.
    pub fn is_set(&self) -> bool {
        !self.lock.locked()
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}
