use std::io;
use std::thread;

/// Start a detached worker thread running `f`.
///
/// The join handle is dropped on purpose: observing the work is the caller's
/// business (a promise, an event, a notification), not the thread's.
pub fn spawn_detached<F>(name: &str, f: F) -> io::Result<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new().name(name.to_string()).spawn(f).map(drop)
}
