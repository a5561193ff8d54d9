use parking_lot::Mutex;

use crate::notify::Notification;

/// Counting semaphore over the notification primitive.
#[derive(Debug)]
pub struct Semaphore {
    remaining: Mutex<usize>,
    waiters: Notification,
}

impl Semaphore {
    /// Create a semaphore with `limit` permits.
    pub fn new(limit: usize) -> Self {
        Self {
            remaining: Mutex::new(limit),
            waiters: Notification::new(),
        }
    }

    /// Take a permit, blocking until one is available.
    pub fn acquire(&self) {
        loop {
            let waiter = {
                let mut remaining = self.remaining.lock();
                if *remaining > 0 {
                    *remaining -= 1;
                    return;
                }
                // Registered under the counter lock so a release in between
                // cannot be missed.
                self.waiters.waiter()
            };
            waiter.wait();
        }
    }

    /// Return a permit and wake one blocked acquirer.
    pub fn release(&self) {
        *self.remaining.lock() += 1;
        self.waiters.notify_one();
    }

    /// Permits currently available.
    pub fn remaining(&self) -> usize {
        *self.remaining.lock()
    }

    /// Take a permit and return a guard that gives it back on drop.
    pub fn access(&self) -> SemaphorePermit<'_> {
        self.acquire();
        SemaphorePermit { semaphore: self }
    }
}

/// RAII permit returned by [`Semaphore::access`].
#[derive(Debug)]
pub struct SemaphorePermit<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}
