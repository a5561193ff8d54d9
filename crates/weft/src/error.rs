use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Misuse of the toolkit API, raised at the call site.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    /// `Thread::start` on a thread that was already started.
    #[error("thread has already been started")]
    ThreadAlreadyStarted,
    /// `Thread::join` on a thread that was never started.
    #[error("thread has not started, cannot join it")]
    ThreadNotStarted,
    /// `Pool::submit` after `Pool::shutdown` began.
    #[error("pool is shutting down, cannot add more tasks")]
    PoolShuttingDown,
    /// A group name with no non-empty segments.
    #[error("group name has no segments")]
    EmptyGroupName,
    /// A second extension bound to the same group.
    #[error("an extension is already registered for group `{0}`")]
    ExtensionAlreadyRegistered(String),
}

/// The distinguished error raised by a supervisor's replacement submitter.
///
/// Jobs that keep submitting after [`Supervisor::shutdown`] observe this
/// error; the supervisor suppresses it while joining its services.
///
/// [`Supervisor::shutdown`]: crate::Supervisor::shutdown
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("supervisor is shutting down")]
pub struct ShutdownSignal;

/// Captured outcome of a failed task.
///
/// Cloneable so a promise can hand the same outcome to every consumer, on
/// every call.
#[derive(Debug, Clone)]
pub enum TaskError {
    /// The task returned an error.
    Failed(Arc<anyhow::Error>),
    /// The task panicked; the payload is the panic message.
    Panicked(String),
}

impl TaskError {
    /// Whether this failure is rooted in a [`ShutdownSignal`].
    pub fn is_shutdown_signal(&self) -> bool {
        match self {
            TaskError::Failed(err) => error_is_shutdown(err),
            TaskError::Panicked(_) => false,
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Failed(err) => write!(f, "task failed: {err:#}"),
            TaskError::Panicked(message) => write!(f, "task panicked: {message}"),
        }
    }
}

impl StdError for TaskError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            TaskError::Failed(err) => {
                let source: &(dyn StdError + 'static) = (**err).as_ref();
                Some(source)
            }
            TaskError::Panicked(_) => None,
        }
    }
}

/// Whether `err` is, or wraps through captured task layers, the shutdown
/// signal.
pub(crate) fn error_is_shutdown(err: &anyhow::Error) -> bool {
    if err.is::<ShutdownSignal>() {
        return true;
    }
    err.downcast_ref::<TaskError>()
        .is_some_and(TaskError::is_shutdown_signal)
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{ShutdownSignal, TaskError, error_is_shutdown};

    #[test]
    fn shutdown_signal_is_detected_through_capture_layers() {
        let direct = anyhow::Error::new(ShutdownSignal);
        assert!(error_is_shutdown(&direct));

        let captured = TaskError::Failed(Arc::new(anyhow::Error::new(ShutdownSignal)));
        assert!(captured.is_shutdown_signal());

        let rewrapped = anyhow::Error::new(captured);
        assert!(error_is_shutdown(&rewrapped));

        let unrelated = anyhow::anyhow!("disk on fire");
        assert!(!error_is_shutdown(&unrelated));
        assert!(!TaskError::Panicked("boom".to_string()).is_shutdown_signal());
    }
}
