#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! In-process concurrency toolkit: user threads and promises, bounded worker
//! pools behind an ambient submit context, a job algebra (once / retry /
//! loop) driven by supervisors, blocking synchronization primitives, and a
//! hierarchical publish/subscribe bus with per-topic extensions.

mod error;
mod extension;
mod group;
mod job;
mod mailbox;
mod metrics;
mod pool;
mod promise;
mod registry;
mod submit;
mod supervisor;
mod thread;
mod trigger;

pub use error::{ShutdownSignal, TaskError, UsageError};
pub use extension::{Extension, MessagePolicy, Payload, Transform};
pub use group::Group;
pub use job::{CrashManager, Job, JobFn, RetryLimits};
pub use mailbox::{Mailbox, Message};
pub use metrics::Metrics;
pub use pool::{Pool, PoolScope, PoolSnapshot};
pub use promise::{Promise, ThreadStatus};
pub use submit::{SubmitHandle, submit, submit_global};
pub use supervisor::Supervisor;
pub use thread::Thread;
pub use trigger::{
    TimeTrigger, Trigger, TriggerAtom, sleep, sleep_indefinitely, wait_until_trigger,
};
pub use weft_sync::{
    Barrier, Event, Lock, LockGuard, Notification, OverflowPolicy, Queue, Semaphore,
    SemaphorePermit, SyncError, Waiter, spawn_detached,
};
