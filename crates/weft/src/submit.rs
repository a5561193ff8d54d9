use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ShutdownSignal;
use crate::pool::Pool;
use crate::promise::Promise;
use crate::registry::registry;
use crate::thread::Thread;

/// Route a task to the innermost scoped pool, or to a fresh detached thread
/// when no pool scope is active.
pub fn submit<T, F>(task: F) -> anyhow::Result<Promise<T>>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    match registry().innermost_pool() {
        Some(pool) => pool.submit(task),
        None => submit_global(task),
    }
}

/// Run a task on its own fresh detached thread, bypassing any pool scope.
pub fn submit_global<T, F>(task: F) -> anyhow::Result<Promise<T>>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    let thread = Thread::new(task);
    thread.start()?;
    Ok(thread.promise())
}

#[derive(Clone)]
enum Submitter {
    Global,
    Pool(Pool),
    Closed,
}

/// Shared, swappable submission strategy handed to jobs.
///
/// A supervisor shutdown swaps the strategy for a refusing sentinel; running
/// jobs observe the swap on their next submission as a [`ShutdownSignal`].
#[derive(Clone)]
pub struct SubmitHandle {
    inner: Arc<RwLock<Submitter>>,
}

impl SubmitHandle {
    /// Handle that always spawns fresh detached threads.
    pub fn global() -> Self {
        Self::with(Submitter::Global)
    }

    /// Handle that submits into `pool`.
    pub fn to_pool(pool: Pool) -> Self {
        Self::with(Submitter::Pool(pool))
    }

    fn with(submitter: Submitter) -> Self {
        Self {
            inner: Arc::new(RwLock::new(submitter)),
        }
    }

    /// Submit through the current strategy.
    pub fn submit<T, F>(&self, task: F) -> anyhow::Result<Promise<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let submitter = self.inner.read().clone();
        match submitter {
            Submitter::Global => submit_global(task),
            Submitter::Pool(pool) => pool.submit(task),
            Submitter::Closed => Err(ShutdownSignal.into()),
        }
    }

    /// Swap in the refusing sentinel.
    pub(crate) fn close(&self) {
        *self.inner.write() = Submitter::Closed;
    }
}
