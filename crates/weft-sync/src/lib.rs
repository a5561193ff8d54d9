#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Low-level substrate for the `weft` toolkit: a detached thread-spawn shim
//! and blocking synchronization primitives (lock, notification, event,
//! semaphore, barrier, bounded queue).

mod barrier;
mod error;
mod event;
mod lock;
mod notify;
mod queue;
mod semaphore;
mod spawn;

pub use barrier::Barrier;
pub use error::SyncError;
pub use event::Event;
pub use lock::{Lock, LockGuard};
pub use notify::{Notification, Waiter};
pub use queue::{OverflowPolicy, Queue};
pub use semaphore::{Semaphore, SemaphorePermit};
pub use spawn::spawn_detached;
