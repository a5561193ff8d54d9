use std::sync::Arc;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;
use weft_sync::Event;

use crate::error::TaskError;
use crate::registry::registry;
use crate::thread::Thread;

/// Lifecycle stage of a single-shot task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Not yet started.
    NotStarted,
    /// A runner is executing the task.
    Running,
    /// Terminal: a value or a captured failure is available.
    Finished,
}

enum State<T> {
    NotStarted,
    Running,
    Finished(Result<T, TaskError>),
}

/// Status slot owned by exactly one runner and observed by any number of
/// consumers; a completion event latches on the transition into finished.
pub(crate) struct StatusCell<T> {
    state: Mutex<State<T>>,
    finished: Event,
}

impl<T> StatusCell<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State::NotStarted),
            finished: Event::new(),
        }
    }

    pub(crate) fn status(&self) -> ThreadStatus {
        match &*self.state.lock() {
            State::NotStarted => ThreadStatus::NotStarted,
            State::Running => ThreadStatus::Running,
            State::Finished(_) => ThreadStatus::Finished,
        }
    }

    pub(crate) fn mark_running(&self) {
        *self.state.lock() = State::Running;
        registry().alive_tasks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn finish(&self, outcome: Result<T, TaskError>) {
        {
            let mut state = self.state.lock();
            if matches!(&*state, State::Running) {
                registry().alive_tasks.fetch_sub(1, Ordering::Relaxed);
            }
            *state = State::Finished(outcome);
        }
        let _ = self.finished.set();
    }

    pub(crate) fn wait(&self) {
        self.finished.wait();
    }
}

impl<T: Clone> StatusCell<T> {
    pub(crate) fn result(&self) -> Result<T, TaskError> {
        self.finished.wait();
        match &*self.state.lock() {
            State::Finished(Ok(value)) => Ok(value.clone()),
            State::Finished(Err(err)) => Err(err.clone()),
            State::NotStarted | State::Running => {
                unreachable!("completion event latched before the status slot was finished")
            }
        }
    }
}

enum PromiseInner<T> {
    Thread(Thread<T>),
    Cell(Arc<StatusCell<T>>),
}

/// Completion handle for a single-shot task.
///
/// A promise either wraps a [`Thread`] (and reads that thread's status
/// transitively) or owns a free-standing status slot written by a pool
/// worker.
pub struct Promise<T> {
    inner: PromiseInner<T>,
}

impl<T> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise").finish_non_exhaustive()
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        let inner = match &self.inner {
            PromiseInner::Thread(thread) => PromiseInner::Thread(thread.clone()),
            PromiseInner::Cell(cell) => PromiseInner::Cell(cell.clone()),
        };
        Self { inner }
    }
}

impl<T> Promise<T> {
    pub(crate) fn from_thread(thread: Thread<T>) -> Self {
        Self {
            inner: PromiseInner::Thread(thread),
        }
    }

    pub(crate) fn from_cell(cell: Arc<StatusCell<T>>) -> Self {
        Self {
            inner: PromiseInner::Cell(cell),
        }
    }

    fn cell(&self) -> &StatusCell<T> {
        match &self.inner {
            PromiseInner::Thread(thread) => thread.cell(),
            PromiseInner::Cell(cell) => cell,
        }
    }

    /// Current lifecycle stage.
    pub fn status(&self) -> ThreadStatus {
        self.cell().status()
    }

    /// Whether the underlying task has started.
    pub fn started(&self) -> bool {
        self.status() != ThreadStatus::NotStarted
    }

    /// Whether the underlying task reached its terminal state.
    pub fn finished(&self) -> bool {
        self.status() == ThreadStatus::Finished
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Block until the task finishes, then return its value or re-raise the
    /// captured failure. Idempotent: every call observes the same outcome.
    pub fn result(&self) -> anyhow::Result<T> {
        match &self.inner {
            PromiseInner::Thread(thread) => thread.join(),
            PromiseInner::Cell(cell) => cell.result().map_err(anyhow::Error::new),
        }
    }

    /// Await completion without blocking the async runtime; the blocking
    /// wait is offloaded to a helper thread.
    pub async fn resolve(&self) -> anyhow::Result<T> {
        let this = self.clone();
        match tokio::task::spawn_blocking(move || this.result()).await {
            Ok(result) => result,
            Err(err) => Err(anyhow::anyhow!("promise wait task join error: {err:#}")),
        }
    }
}
