use std::sync::atomic::Ordering;

use serde::{Deserialize, Serialize};

use crate::registry::registry;

/// Point-in-time counters over the process-wide runtime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metrics {
    /// Tasks queued in pools and not yet picked up by a worker.
    pub queue_global_depth: u64,
    /// Runners currently executing a task.
    pub num_alive_tasks: u64,
    /// Live pool workers.
    pub num_workers: u64,
}

impl Metrics {
    /// Read the current counters.
    pub fn fetch() -> Self {
        let registry = registry();
        Self {
            queue_global_depth: registry.queued_tasks.load(Ordering::Relaxed),
            num_alive_tasks: registry.alive_tasks.load(Ordering::Relaxed),
            num_workers: registry.pool_workers.load(Ordering::Relaxed),
        }
    }
}
