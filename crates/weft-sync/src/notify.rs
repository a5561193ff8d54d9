use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::lock::Lock;

/// FIFO queue of suspended waiters.
///
/// Each waiter parks on a fresh pre-acquired [`Lock`]: registration performs
/// the first acquire and queues the lock, parking performs the second, and a
/// notify releases queued locks in arrival order. No spurious wakeups are
/// introduced; callers that guard a predicate must re-check it after waking.
#[derive(Debug, Default)]
pub struct Notification {
    waiters: Mutex<VecDeque<Lock>>,
}

impl Notification {
    /// Create an empty waiter queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter without blocking.
    ///
    /// The returned handle occupies its queue slot immediately, which lets a
    /// caller register under its own state lock and park after releasing it;
    /// a notify that lands in between is not lost.
    pub fn waiter(&self) -> Waiter {
        let lock = Lock::new();
        lock.acquire();
        self.waiters.lock().push_back(lock.clone());
        Waiter { lock }
    }

    /// Park the caller until notified.
    pub fn wait(&self) {
        self.waiter().wait();
    }

    /// Wake the first `count` waiters in FIFO order, or everyone still
    /// queued when fewer are waiting.
    pub fn notify(&self, count: usize) {
        let woken: Vec<Lock> = {
            let mut waiters = self.waiters.lock();
            let take = count.min(waiters.len());
            waiters.drain(..take).collect()
        };
        for lock in woken {
            lock.release();
        }
    }

    /// Wake the first waiter, if any.
    pub fn notify_one(&self) {
        self.notify(1);
    }

    /// Wake every queued waiter.
    pub fn notify_all(&self) {
        self.notify(usize::MAX);
    }

    /// Number of currently queued waiters.
    pub fn waiting(&self) -> usize {
        self.waiters.lock().len()
    }
}

/// A registered, not-yet-parked waiter. See [`Notification::waiter`].
#[derive(Debug)]
pub struct Waiter {
    lock: Lock,
}

impl Waiter {
    /// Park until notified; returns immediately if the notification already
    /// arrived.
    pub fn wait(self) {
        self.lock.acquire();
    }
}
