use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use weft_sync::spawn_detached;

use crate::error::{TaskError, UsageError, panic_message};
use crate::promise::{Promise, StatusCell, ThreadStatus};

pub(crate) type TaskFn<T> = Box<dyn FnOnce() -> anyhow::Result<T> + Send>;

/// Run a task against its status slot: mark running, execute, capture the
/// value, the error, or the panic, then latch the completion event.
pub(crate) fn run_task<T>(cell: &StatusCell<T>, task: TaskFn<T>) {
    cell.mark_running();
    let outcome = match catch_unwind(AssertUnwindSafe(task)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TaskError::Failed(Arc::new(err))),
        Err(payload) => {
            let message = panic_message(payload);
            tracing::warn!("task panicked: {message}");
            Err(TaskError::Panicked(message))
        }
    };
    cell.finish(outcome);
}

struct ThreadInner<T> {
    task: Mutex<Option<TaskFn<T>>>,
    cell: StatusCell<T>,
    started: AtomicBool,
}

/// A single-shot task bound to its own detached worker thread.
pub struct Thread<T> {
    inner: Arc<ThreadInner<T>>,
}

impl<T> Clone for Thread<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> Thread<T> {
    /// Create an unstarted thread around `task`.
    pub fn new<F>(task: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        Self {
            inner: Arc::new(ThreadInner {
                task: Mutex::new(Some(Box::new(task))),
                cell: StatusCell::new(),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Spawn the detached worker. A thread starts at most once.
    pub fn start(&self) -> anyhow::Result<()> {
        let Some(task) = self.inner.task.lock().take() else {
            return Err(UsageError::ThreadAlreadyStarted.into());
        };
        self.inner.started.store(true, Ordering::SeqCst);
        let inner = self.inner.clone();
        spawn_detached("weft-thread", move || run_task(&inner.cell, task))?;
        Ok(())
    }
}

impl<T> Thread<T> {
    pub(crate) fn cell(&self) -> &StatusCell<T> {
        &self.inner.cell
    }

    /// Current lifecycle stage.
    pub fn status(&self) -> ThreadStatus {
        self.inner.cell.status()
    }

    /// Whether the worker is currently executing the task.
    pub fn running(&self) -> bool {
        self.status() == ThreadStatus::Running
    }

    /// Whether the task reached its terminal state.
    pub fn finished(&self) -> bool {
        self.status() == ThreadStatus::Finished
    }

    /// A promise observing this thread.
    pub fn promise(&self) -> Promise<T> {
        Promise::from_thread(self.clone())
    }
}

impl<T: Clone + Send + 'static> Thread<T> {
    /// Block until the task finishes; returns its value or re-raises the
    /// captured failure. Joining a never-started thread is a usage error.
    pub fn join(&self) -> anyhow::Result<T> {
        if !self.inner.started.load(Ordering::SeqCst) {
            return Err(UsageError::ThreadNotStarted.into());
        }
        self.inner.cell.result().map_err(anyhow::Error::new)
    }
}
