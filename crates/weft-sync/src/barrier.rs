use parking_lot::Mutex;

use crate::notify::Notification;

/// Cyclic two-phase rendezvous for a fixed number of participants.
///
/// `push` blocks until every participant has arrived (phase one) and then
/// until every participant has observed the release (phase two), so nobody
/// can lap the group and re-enter while stragglers are still leaving.
#[derive(Debug)]
pub struct Barrier {
    required: usize,
    present: Mutex<usize>,
    arrived: Notification,
    departed: Notification,
}

impl Barrier {
    /// Create a barrier for `participants` threads.
    pub fn new(participants: usize) -> Self {
        Self {
            required: participants,
            present: Mutex::new(0),
            arrived: Notification::new(),
            departed: Notification::new(),
        }
    }

    /// Enter the rendezvous; returns once all participants have passed both
    /// phases.
    pub fn push(&self) {
        let waiter = {
            let mut present = self.present.lock();
            *present += 1;
            if *present == self.required {
                self.arrived.notify_all();
                None
            } else {
                Some(self.arrived.waiter())
            }
        };
        if let Some(waiter) = waiter {
            waiter.wait();
        }

        let waiter = {
            let mut present = self.present.lock();
            *present -= 1;
            if *present == 0 {
                self.departed.notify_all();
                None
            } else {
                Some(self.departed.waiter())
            }
        };
        if let Some(waiter) = waiter {
            waiter.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::Barrier;

    #[test]
    fn incomplete_group_stays_blocked() {
        let barrier = Arc::new(Barrier::new(3));
        let mut handles = Vec::new();
        for _ in 0..2 {
            let barrier = barrier.clone();
            handles.push(std::thread::spawn(move || barrier.push()));
        }

        std::thread::sleep(Duration::from_millis(50));
        for handle in &handles {
            assert!(!handle.is_finished());
        }

        barrier.push();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn barrier_is_reusable() {
        let barrier = Arc::new(Barrier::new(2));
        for _ in 0..3 {
            let other = barrier.clone();
            let handle = std::thread::spawn(move || other.push());
            barrier.push();
            handle.join().unwrap();
        }
    }
}
