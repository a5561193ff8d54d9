use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::error_is_shutdown;
use crate::job::Job;
use crate::pool::Pool;
use crate::promise::Promise;
use crate::submit::SubmitHandle;

trait Service: Send {
    fn join(&self) -> anyhow::Result<()>;
}

impl<T: Clone + Send + 'static> Service for Promise<T> {
    fn join(&self) -> anyhow::Result<()> {
        self.result().map(|_| ())
    }
}

/// Named registry of long-running services driven onto a swappable
/// submitter.
///
/// `shutdown` (also run on drop) swaps the submitter for a sentinel that
/// raises [`ShutdownSignal`], joins every registered service while
/// suppressing that signal, then stops the owned pool, if any.
///
/// [`ShutdownSignal`]: crate::ShutdownSignal
pub struct Supervisor {
    handle: SubmitHandle,
    services: Mutex<HashMap<String, Box<dyn Service>>>,
    pool: Option<Pool>,
    shut: AtomicBool,
}

impl Supervisor {
    /// Supervisor submitting to fresh detached threads.
    pub fn new() -> Self {
        Self {
            handle: SubmitHandle::global(),
            services: Mutex::new(HashMap::new()),
            pool: None,
            shut: AtomicBool::new(false),
        }
    }

    /// Supervisor owning its own pool of `workers`.
    ///
    /// Jobs submit their attempts and crash managers back through the same
    /// pool, so size it for that nesting; a `Loop` service occupies one
    /// worker for its driver alone.
    pub fn with_pool(workers: usize) -> Self {
        let pool = Pool::new(workers);
        Self {
            handle: SubmitHandle::to_pool(pool.clone()),
            services: Mutex::new(HashMap::new()),
            pool: Some(pool),
            shut: AtomicBool::new(false),
        }
    }

    /// The submit handle services run under.
    pub fn handle(&self) -> &SubmitHandle {
        &self.handle
    }

    /// Install a running promise for `job` under `name`, replacing any
    /// previous service of that name.
    pub fn start_service<T: Clone + Send + 'static>(
        &self,
        name: &str,
        job: &Job<T>,
    ) -> anyhow::Result<()> {
        let promise = job.promise(&self.handle)?;
        tracing::debug!(name, "service started");
        self.services
            .lock()
            .insert(name.to_string(), Box::new(promise));
        Ok(())
    }

    /// Stop accepting work, join every service suppressing the shutdown
    /// signal, then stop the owned pool. Idempotent.
    pub fn shutdown(&self) {
        if self.shut.swap(true, Ordering::SeqCst) {
            return;
        }
        self.handle.close();
        let services: Vec<(String, Box<dyn Service>)> = self.services.lock().drain().collect();
        for (name, service) in services {
            match service.join() {
                Ok(()) => tracing::debug!(name, "service finished"),
                Err(err) if error_is_shutdown(&err) => tracing::debug!(name, "service stopped"),
                Err(err) => tracing::warn!(name, "service failed during shutdown: {err:#}"),
            }
        }
        if let Some(pool) = &self.pool {
            pool.shutdown();
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{Duration, Instant};

    use super::Supervisor;
    use crate::error::error_is_shutdown;
    use crate::job::{Job, RetryLimits};

    fn wait_until(deadline_secs: u64, condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(deadline_secs);
        while !condition() {
            assert!(Instant::now() < deadline, "condition never held");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn shutdown_suppresses_the_signal_and_rejects_new_services() {
        let supervisor = Supervisor::new();
        let turns = Arc::new(AtomicU32::new(0));
        let counter = turns.clone();
        let worker = Job::forever(Job::retry(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            RetryLimits::UNBOUNDED,
        ));
        supervisor.start_service("w", &worker).unwrap();

        wait_until(5, || turns.load(Ordering::SeqCst) > 2);
        supervisor.shutdown();

        let late: Job<()> = Job::once(|| Ok(()));
        let err = supervisor.start_service("late", &late).unwrap_err();
        assert!(error_is_shutdown(&err));
    }

    #[test]
    fn shutdown_joins_services_that_finish_on_their_own() {
        let supervisor = Supervisor::new();
        let ran = Arc::new(AtomicU32::new(0));
        let counter = ran.clone();
        let one_shot = Job::once(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        supervisor.start_service("one-shot", &one_shot).unwrap();
        supervisor.shutdown();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn owned_pool_runs_services_and_stops_last() {
        let supervisor = Supervisor::with_pool(2);
        let ran = Arc::new(AtomicU32::new(0));
        let counter = ran.clone();
        let job = Job::once(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        supervisor.start_service("pooled", &job).unwrap();
        supervisor.shutdown();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_is_shutdown() {
        let turns = Arc::new(AtomicU32::new(0));
        {
            let supervisor = Supervisor::new();
            let counter = turns.clone();
            let worker = Job::forever(Job::retry(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                RetryLimits::UNBOUNDED,
            ));
            supervisor.start_service("w", &worker).unwrap();
            wait_until(5, || turns.load(Ordering::SeqCst) > 0);
        }

        // The loop driver is gone: the counter settles.
        let settled = turns.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(turns.load(Ordering::SeqCst), settled);
    }
}
