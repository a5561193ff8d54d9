use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::group::Group;

/// Type-erased message content, cheaply cloneable for fan-out.
#[derive(Clone)]
pub struct Payload {
    value: Arc<dyn Any + Send + Sync>,
}

impl Payload {
    /// Wrap a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
        }
    }

    /// Borrow the content as `T`, if that is what it holds.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Payload(..)")
    }
}

/// One-shot content rewrite applied by a policy.
pub type Transform = Box<dyn FnOnce(Payload) -> Payload + Send>;

/// Verdict of an extension for one message in its subtree.
#[derive(Default)]
pub struct MessagePolicy {
    /// Suppress direct delivery and parent/child propagation at this node.
    pub cancel: bool,
    /// Extra sends fired from this node regardless of `cancel`.
    pub forward_to: Vec<Group>,
    /// Content rewrite applied before delivery, propagation, and forwards.
    pub transform: Option<Transform>,
}

/// Per-group policy hook with a supervised background worker.
///
/// At most one extension binds to any group; see [`Group::add_extension`].
pub trait Extension: Send + Sync {
    /// Policy for a message sent in the bound group's subtree. `None` means
    /// the default policy: deliver, no forwards, identity transform.
    fn on_message(&self, content: &Payload) -> Option<MessagePolicy>;

    /// Long-running worker; restarted by the bus supervisor on failure, up
    /// to [`Group::EXTENSION_RETRY_LIMITS`].
    fn background_worker(&self) -> anyhow::Result<()>;
}
