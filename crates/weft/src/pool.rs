use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use weft_sync::{Notification, Waiter, spawn_detached};

use crate::error::UsageError;
use crate::promise::{Promise, StatusCell};
use crate::registry::registry;
use crate::thread::run_task;

struct Task {
    run: Box<dyn FnOnce() + Send>,
}

struct PoolInner {
    tasks: Mutex<VecDeque<Task>>,
    task_added: Notification,
    task_processed: Notification,
    busy: Vec<AtomicBool>,
    shutting_down: AtomicBool,
    active: AtomicBool,
}

/// Point-in-time view of a pool, for observers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolSnapshot {
    /// Tasks waiting in the deque.
    pub queued: usize,
    /// Total workers.
    pub workers: usize,
    /// Workers currently executing a task.
    pub busy: usize,
    /// Whether `shutdown` has begun.
    pub shutting_down: bool,
}

/// Fixed-size worker set draining a shared task deque.
///
/// Workers park on the task-added notification while the deque is empty and
/// write status transitions into each task's promise. `shutdown` drains the
/// deque before stopping the workers.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

enum WorkerStep {
    Run(Task),
    Park(Waiter),
}

impl Pool {
    /// Default worker count.
    pub const DEFAULT_WORKERS: usize = 4;

    /// Start a pool of `workers` detached workers (at least one).
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let inner = Arc::new(PoolInner {
            tasks: Mutex::new(VecDeque::new()),
            task_added: Notification::new(),
            task_processed: Notification::new(),
            busy: (0..workers).map(|_| AtomicBool::new(false)).collect(),
            shutting_down: AtomicBool::new(false),
            active: AtomicBool::new(true),
        });
        for worker_idx in 0..workers {
            let inner = inner.clone();
            let name = format!("weft-pool-worker-{worker_idx}");
            if let Err(err) = spawn_detached(&name, move || worker_loop(&inner, worker_idx)) {
                tracing::warn!(worker_idx, "failed to spawn pool worker: {err:#}");
            }
        }
        Self { inner }
    }

    /// Queue `task` and return its promise. Fails once shutdown has begun.
    pub fn submit<T, F>(&self, task: F) -> anyhow::Result<Promise<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let cell = Arc::new(StatusCell::new());
        let run_cell = cell.clone();
        let run: Box<dyn FnOnce() + Send> = Box::new(move || run_task(&run_cell, Box::new(task)));
        {
            let mut tasks = self.inner.tasks.lock();
            if self.inner.shutting_down.load(Ordering::SeqCst) {
                return Err(UsageError::PoolShuttingDown.into());
            }
            tasks.push_back(Task { run });
            registry().queued_tasks.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.task_added.notify_one();
        Ok(Promise::from_cell(cell))
    }

    /// Submit `f` over every element and return the promises in input order.
    pub fn imap<A, T, F>(
        &self,
        f: F,
        items: impl IntoIterator<Item = A>,
    ) -> anyhow::Result<Vec<Promise<T>>>
    where
        A: Send + 'static,
        T: Send + 'static,
        F: Fn(A) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        items
            .into_iter()
            .map(|item| {
                let f = f.clone();
                self.submit(move || f(item))
            })
            .collect()
    }

    /// Submit `f` over every element and join the results in input order.
    pub fn map<A, T, F>(&self, f: F, items: impl IntoIterator<Item = A>) -> anyhow::Result<Vec<T>>
    where
        A: Send + 'static,
        T: Clone + Send + 'static,
        F: Fn(A) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let promises = self.imap(f, items)?;
        promises.iter().map(Promise::result).collect()
    }

    /// Whether the pool still executes work.
    pub fn active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Queue depth and worker business right now.
    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            queued: self.inner.tasks.lock().len(),
            workers: self.inner.busy.len(),
            busy: self
                .inner
                .busy
                .iter()
                .filter(|flag| flag.load(Ordering::SeqCst))
                .count(),
            shutting_down: self.inner.shutting_down.load(Ordering::SeqCst),
        }
    }

    /// Refuse new submissions, drain queued tasks, then stop the workers.
    /// Idempotent.
    pub fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        loop {
            let waiter = {
                let tasks = self.inner.tasks.lock();
                if tasks.is_empty() {
                    break;
                }
                self.inner.task_processed.waiter()
            };
            waiter.wait();
        }
        self.inner.active.store(false, Ordering::SeqCst);
        // The queue mutex fences worker waiter registration: nobody is mid
        // registration once it has been taken here, so the final wakeup
        // reaches every parked worker.
        drop(self.inner.tasks.lock());
        self.inner.task_added.notify_all();
    }

    /// Push this pool onto the ambient submit stack. Dropping the returned
    /// scope pops the stack and shuts the pool down.
    pub fn enter(&self) -> PoolScope {
        registry().push_pool(self.clone());
        tracing::debug!("scoped pool entered");
        PoolScope { pool: self.clone() }
    }
}

fn worker_loop(inner: &Arc<PoolInner>, worker_idx: usize) {
    registry().pool_workers.fetch_add(1, Ordering::Relaxed);
    tracing::debug!(worker_idx, "pool worker started");
    loop {
        inner.busy[worker_idx].store(false, Ordering::SeqCst);
        let step = {
            let mut tasks = inner.tasks.lock();
            if !inner.active.load(Ordering::SeqCst) {
                break;
            }
            match tasks.pop_front() {
                Some(task) => WorkerStep::Run(task),
                None => WorkerStep::Park(inner.task_added.waiter()),
            }
        };
        match step {
            WorkerStep::Park(waiter) => waiter.wait(),
            WorkerStep::Run(task) => {
                registry().queued_tasks.fetch_sub(1, Ordering::Relaxed);
                inner.busy[worker_idx].store(true, Ordering::SeqCst);
                (task.run)();
                inner.task_processed.notify_all();
            }
        }
    }
    registry().pool_workers.fetch_sub(1, Ordering::Relaxed);
    tracing::debug!(worker_idx, "pool worker stopped");
}

/// RAII guard for a pool on the ambient submit stack.
pub struct PoolScope {
    pool: Pool,
}

impl Drop for PoolScope {
    fn drop(&mut self) {
        registry().pop_pool();
        tracing::debug!("scoped pool exited");
        self.pool.shutdown();
    }
}
