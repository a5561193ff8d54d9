use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::error::SyncError;
use crate::notify::Notification;

/// Behavior of [`Queue::add`] when the queue is at capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Fail the add with [`SyncError::QueueFull`].
    #[default]
    Raise,
    /// Block until a slot frees up.
    Block,
    /// Silently discard the incoming element.
    Drop,
}

/// Bounded FIFO buffer with a configurable overflow policy.
///
/// `pop` blocks while the queue is empty; `add` applies the overflow policy
/// when it is full.
#[derive(Debug)]
pub struct Queue<T> {
    capacity: Option<usize>,
    policy: OverflowPolicy,
    items: Mutex<VecDeque<T>>,
    added: Notification,
    popped: Notification,
}

impl<T> Queue<T> {
    /// Create a queue holding at most `capacity` elements (`None` for
    /// unbounded) under the given overflow policy.
    pub fn new(capacity: Option<usize>, policy: OverflowPolicy) -> Self {
        Self {
            capacity,
            policy,
            items: Mutex::new(VecDeque::new()),
            added: Notification::new(),
            popped: Notification::new(),
        }
    }

    /// Number of buffered elements.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Append an element, applying the overflow policy when full.
    pub fn add(&self, item: T) -> Result<(), SyncError> {
        loop {
            let waiter = {
                let mut items = self.items.lock();
                if self.capacity.is_some_and(|cap| items.len() >= cap) {
                    match self.policy {
                        OverflowPolicy::Raise => return Err(SyncError::QueueFull),
                        OverflowPolicy::Drop => return Ok(()),
                        OverflowPolicy::Block => self.popped.waiter(),
                    }
                } else {
                    items.push_back(item);
                    drop(items);
                    self.added.notify_one();
                    return Ok(());
                }
            };
            waiter.wait();
        }
    }

    /// Remove and return the oldest element, blocking while empty.
    pub fn pop(&self) -> T {
        loop {
            let waiter = {
                let mut items = self.items.lock();
                if let Some(item) = items.pop_front() {
                    drop(items);
                    self.popped.notify_one();
                    return item;
                }
                self.added.waiter()
            };
            waiter.wait();
        }
    }
}
