use std::sync::Arc;

use crate::error::TaskError;
use crate::promise::Promise;
use crate::submit::SubmitHandle;

/// Task body run under a job.
pub type JobFn<T> = Arc<dyn Fn() -> anyhow::Result<T> + Send + Sync>;

/// Failure hook: receives the captured failure and may produce a replacement
/// result (`Some`) or decline (`None`). It runs as its own submitted task.
pub type CrashManager<T> = Arc<dyn Fn(TaskError) -> anyhow::Result<Option<T>> + Send + Sync>;

/// Failure budget for [`Job::Retry`]. `None` bounds are unbounded.
///
/// The bounds are independent: the consecutive counter resets on every
/// success, the total counter never does, and exceeding either escalates the
/// last failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryLimits {
    /// Escalate after this many failures in a row.
    pub max_consecutive_failures: Option<u32>,
    /// Escalate after this many failures overall.
    pub max_total_failures: Option<u32>,
}

impl RetryLimits {
    /// No bounds: retry forever.
    pub const UNBOUNDED: RetryLimits = RetryLimits {
        max_consecutive_failures: None,
        max_total_failures: None,
    };
}

/// Declarative lifecycle rule that, given a submitter, produces a promise
/// for a supervised execution.
#[derive(Clone)]
pub enum Job<T> {
    /// Run the body once; a failure consults the crash manager, then
    /// escalates.
    Once {
        /// Task body.
        run: JobFn<T>,
        /// Optional failure hook.
        crash_manager: Option<CrashManager<T>>,
    },
    /// Run the body until it succeeds or the failure budget is exhausted.
    Retry {
        /// Task body.
        run: JobFn<T>,
        /// Optional failure hook.
        crash_manager: Option<CrashManager<T>>,
        /// Failure budget.
        limits: RetryLimits,
    },
    /// Run the inner job forever; returns only when the inner escalates.
    Loop(Box<Job<T>>),
}

impl<T: Clone + Send + 'static> Job<T> {
    /// A `Once` job without a crash manager.
    pub fn once<F>(run: F) -> Self
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Job::Once {
            run: Arc::new(run),
            crash_manager: None,
        }
    }

    /// A `Retry` job without a crash manager.
    pub fn retry<F>(run: F, limits: RetryLimits) -> Self
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Job::Retry {
            run: Arc::new(run),
            crash_manager: None,
            limits,
        }
    }

    /// Wrap a job in perpetual execution.
    pub fn forever(inner: Job<T>) -> Self {
        Job::Loop(Box::new(inner))
    }

    /// Attach a crash manager; on a `Loop` it attaches to the inner job.
    pub fn with_crash_manager<F>(self, manager: F) -> Self
    where
        F: Fn(TaskError) -> anyhow::Result<Option<T>> + Send + Sync + 'static,
    {
        self.set_crash_manager(Arc::new(manager))
    }

    fn set_crash_manager(self, manager: CrashManager<T>) -> Self {
        match self {
            Job::Once { run, .. } => Job::Once {
                run,
                crash_manager: Some(manager),
            },
            Job::Retry { run, limits, .. } => Job::Retry {
                run,
                crash_manager: Some(manager),
                limits,
            },
            Job::Loop(inner) => Job::Loop(Box::new(inner.set_crash_manager(manager))),
        }
    }

    /// Submit a supervised execution of this job and return its promise.
    pub fn promise(&self, handle: &SubmitHandle) -> anyhow::Result<Promise<T>> {
        let job = self.clone();
        let job_handle = handle.clone();
        handle.submit(move || job.run_supervised(&job_handle))
    }

    fn run_supervised(&self, handle: &SubmitHandle) -> anyhow::Result<T> {
        match self {
            Job::Once { run, crash_manager } => run_once(run, crash_manager.as_ref(), handle),
            Job::Retry {
                run,
                crash_manager,
                limits,
            } => run_retry(run, crash_manager.as_ref(), *limits, handle),
            Job::Loop(inner) => run_loop(inner, handle),
        }
    }
}

fn run_once<T: Clone + Send + 'static>(
    run: &JobFn<T>,
    crash_manager: Option<&CrashManager<T>>,
    handle: &SubmitHandle,
) -> anyhow::Result<T> {
    match run() {
        Ok(value) => Ok(value),
        Err(err) => {
            let failure = TaskError::Failed(Arc::new(err));
            match consult_crash_manager(crash_manager, &failure, handle)? {
                Some(replacement) => Ok(replacement),
                None => Err(anyhow::Error::new(failure)),
            }
        }
    }
}

fn run_retry<T: Clone + Send + 'static>(
    run: &JobFn<T>,
    crash_manager: Option<&CrashManager<T>>,
    limits: RetryLimits,
    handle: &SubmitHandle,
) -> anyhow::Result<T> {
    let mut budget = FailureBudget::new(limits);
    loop {
        match run() {
            Ok(value) => return Ok(value),
            Err(err) => {
                let failure = TaskError::Failed(Arc::new(err));
                if failure.is_shutdown_signal() {
                    return Err(anyhow::Error::new(failure));
                }
                if let Some(replacement) = consult_crash_manager(crash_manager, &failure, handle)? {
                    return Ok(replacement);
                }
                budget.charge(&failure)?;
            }
        }
    }
}

fn run_loop<T: Clone + Send + 'static>(inner: &Job<T>, handle: &SubmitHandle) -> anyhow::Result<T> {
    match inner {
        // A retrying inner keeps one failure accounting spanning iterations,
        // with every attempt observable as its own submitted promise.
        Job::Retry {
            run,
            crash_manager,
            limits,
        } => {
            let mut budget = FailureBudget::new(*limits);
            loop {
                let attempt = run.clone();
                let promise = handle.submit(move || attempt())?;
                match promise.result() {
                    Ok(_) => budget.succeeded(),
                    Err(err) => {
                        let failure = capture(err);
                        if failure.is_shutdown_signal() {
                            return Err(anyhow::Error::new(failure));
                        }
                        if consult_crash_manager(crash_manager.as_ref(), &failure, handle)?
                            .is_some()
                        {
                            budget.succeeded();
                        } else {
                            budget.charge(&failure)?;
                        }
                    }
                }
            }
        }
        inner => loop {
            inner.promise(handle)?.result()?;
        },
    }
}

fn consult_crash_manager<T: Clone + Send + 'static>(
    crash_manager: Option<&CrashManager<T>>,
    failure: &TaskError,
    handle: &SubmitHandle,
) -> anyhow::Result<Option<T>> {
    let Some(manager) = crash_manager else {
        return Ok(None);
    };
    if failure.is_shutdown_signal() {
        return Ok(None);
    }
    let manager = manager.clone();
    let failure = failure.clone();
    handle.submit(move || manager(failure))?.result()
}

fn capture(err: anyhow::Error) -> TaskError {
    match err.downcast::<TaskError>() {
        Ok(task_err) => task_err,
        Err(other) => TaskError::Failed(Arc::new(other)),
    }
}

struct FailureBudget {
    limits: RetryLimits,
    consecutive: u32,
    total: u32,
}

impl FailureBudget {
    fn new(limits: RetryLimits) -> Self {
        Self {
            limits,
            consecutive: 0,
            total: 0,
        }
    }

    fn succeeded(&mut self) {
        self.consecutive = 0;
    }

    /// Count one failure, escalating it once either bound is exceeded.
    fn charge(&mut self, failure: &TaskError) -> anyhow::Result<()> {
        self.consecutive += 1;
        self.total += 1;
        let over_consecutive = self
            .limits
            .max_consecutive_failures
            .is_some_and(|max| self.consecutive > max);
        let over_total = self
            .limits
            .max_total_failures
            .is_some_and(|max| self.total > max);
        if over_consecutive || over_total {
            return Err(anyhow::Error::new(failure.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{Duration, Instant};

    use super::{Job, RetryLimits};
    use crate::error::error_is_shutdown;
    use crate::submit::SubmitHandle;

    fn always_failing(attempts: Arc<AtomicU32>) -> impl Fn() -> anyhow::Result<u32> {
        move || {
            attempts.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("flaky")
        }
    }

    #[test]
    fn once_escalates_without_a_crash_manager() {
        let handle = SubmitHandle::global();
        let job: Job<u32> = Job::once(|| anyhow::bail!("done for"));
        let err = job.promise(&handle).unwrap().result().unwrap_err();
        assert!(err.to_string().contains("done for"));
    }

    #[test]
    fn once_crash_manager_replacement_becomes_the_result() {
        let handle = SubmitHandle::global();
        let job: Job<u32> =
            Job::once(|| anyhow::bail!("done for")).with_crash_manager(|_failure| Ok(Some(99)));
        assert_eq!(job.promise(&handle).unwrap().result().unwrap(), 99);
    }

    #[test]
    fn once_crash_manager_decline_reraises() {
        let handle = SubmitHandle::global();
        let consulted = Arc::new(AtomicU32::new(0));
        let seen = consulted.clone();
        let job: Job<u32> = Job::once(|| anyhow::bail!("done for")).with_crash_manager(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        });
        let err = job.promise(&handle).unwrap().result().unwrap_err();
        assert!(err.to_string().contains("done for"));
        assert_eq!(consulted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retry_escalates_once_the_consecutive_bound_is_exceeded() {
        let handle = SubmitHandle::global();
        let attempts = Arc::new(AtomicU32::new(0));
        let job = Job::retry(
            always_failing(attempts.clone()),
            RetryLimits {
                max_consecutive_failures: Some(3),
                max_total_failures: Some(5),
            },
        );
        let err = job.promise(&handle).unwrap().result().unwrap_err();
        assert!(err.to_string().contains("flaky"));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn retry_returns_the_first_success() {
        let handle = SubmitHandle::global();
        let attempts = Arc::new(AtomicU32::new(0));
        let tries = attempts.clone();
        let job = Job::retry(
            move || {
                if tries.fetch_add(1, Ordering::SeqCst) < 2 {
                    anyhow::bail!("warming up");
                }
                Ok(5)
            },
            RetryLimits::UNBOUNDED,
        );
        assert_eq!(job.promise(&handle).unwrap().result().unwrap(), 5);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn loop_over_retry_spans_iterations_with_one_budget() {
        let handle = SubmitHandle::global();
        let attempts = Arc::new(AtomicU32::new(0));
        let job = Job::forever(Job::retry(
            always_failing(attempts.clone()),
            RetryLimits {
                max_consecutive_failures: None,
                max_total_failures: Some(2),
            },
        ));
        let err = job.promise(&handle).unwrap().result().unwrap_err();
        assert!(err.to_string().contains("flaky"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn loop_escalates_the_shutdown_signal() {
        let handle = SubmitHandle::global();
        let turns = Arc::new(AtomicU32::new(0));
        let counter = turns.clone();
        let job = Job::forever(Job::once(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        let promise = job.promise(&handle).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while turns.load(Ordering::SeqCst) < 3 {
            assert!(Instant::now() < deadline, "loop never turned");
            std::thread::sleep(Duration::from_millis(5));
        }
        handle.close();

        let err = promise.result().unwrap_err();
        assert!(error_is_shutdown(&err));
    }
}
