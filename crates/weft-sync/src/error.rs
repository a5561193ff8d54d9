/// Errors surfaced by the synchronization primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// `Event::set` on an event that is already set.
    #[error("the event is already set")]
    EventAlreadySet,
    /// `Event::clear` on an event that is not set.
    #[error("the event is not set")]
    EventNotSet,
    /// `Queue::add` on a full queue under the `Raise` overflow policy.
    #[error("the queue is already full")]
    QueueFull,
}
