use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Mutual-exclusion handle with an observable held state.
///
/// Unlike a std mutex the lock has no owner: any holder of a clone may
/// release it, releasing a free lock is a no-op, and a second `acquire` on a
/// held lock blocks until some other party releases it. The notification and
/// event primitives depend on that last property, so the lock must never be
/// made reentrant.
#[derive(Debug, Clone)]
pub struct Lock {
    inner: Arc<LockInner>,
}

#[derive(Debug)]
struct LockInner {
    held: Mutex<bool>,
    freed: Condvar,
}

impl Lock {
    /// Create a free lock.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LockInner {
                held: Mutex::new(false),
                freed: Condvar::new(),
            }),
        }
    }

    /// Block until the lock is free, then take it.
    pub fn acquire(&self) {
        let mut held = self.inner.held.lock();
        while *held {
            self.inner.freed.wait(&mut held);
        }
        *held = true;
    }

    /// Release the lock and wake one blocked acquirer. Releasing a free lock
    /// is a no-op.
    pub fn release(&self) {
        let mut held = self.inner.held.lock();
        if !*held {
            return;
        }
        *held = false;
        drop(held);
        self.inner.freed.notify_one();
    }

    /// Whether the lock is currently held.
    pub fn locked(&self) -> bool {
        *self.inner.held.lock()
    }

    /// Acquire and return a guard that releases on drop.
    pub fn acquired(&self) -> LockGuard<'_> {
        self.acquire();
        LockGuard { lock: self }
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard returned by [`Lock::acquired`].
#[derive(Debug)]
pub struct LockGuard<'a> {
    lock: &'a Lock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
