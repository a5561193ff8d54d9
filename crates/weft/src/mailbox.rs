use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use weft_sync::Notification;

use crate::extension::Payload;
use crate::group::Group;
use crate::registry::registry;

/// A delivered bus message.
#[derive(Debug, Clone)]
pub struct Message {
    /// Group the message was delivered at.
    pub group: Group,
    /// Content, after any extension transform along the way.
    pub payload: Payload,
}

#[derive(Default)]
struct MailboxInner {
    messages: Mutex<VecDeque<Message>>,
    arrival: Notification,
}

/// Per-consumer inbox subscribed to any number of groups.
///
/// Consumption is newest-first: `get` pops the most recent message.
#[derive(Clone, Default)]
pub struct Mailbox {
    inner: Arc<MailboxInner>,
}

impl Mailbox {
    /// Create an inbox with no subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to direct deliveries at `group`.
    pub fn subscribe(&self, group: &Group) {
        registry()
            .subscriptions
            .lock()
            .entry(group.clone())
            .or_default()
            .insert(self.clone());
    }

    /// Drop the subscription at `group`, if present.
    pub fn unsubscribe(&self, group: &Group) {
        if let Some(boxes) = registry().subscriptions.lock().get_mut(group) {
            boxes.remove(self);
        }
    }

    /// Newest buffered message, without blocking.
    pub fn try_get(&self) -> Option<Message> {
        self.inner.messages.lock().pop_back()
    }

    /// Newest buffered message, blocking while the inbox is empty.
    pub fn get(&self) -> Message {
        loop {
            let waiter = {
                let mut messages = self.inner.messages.lock();
                if let Some(message) = messages.pop_back() {
                    return message;
                }
                self.inner.arrival.waiter()
            };
            waiter.wait();
        }
    }

    fn deliver(&self, message: Message) {
        self.inner.messages.lock().push_back(message);
        self.inner.arrival.notify_all();
    }

    /// Send `payload` into the topic tree at `group`.
    ///
    /// The message goes to direct subscribers of `group`, then recursively
    /// to the parent and the children, with the exclusion set growing along
    /// every edge so the parent↔child cycles terminate. The nearest ancestor
    /// extension is consulted at every visited node; its transform rewrites
    /// the content, `cancel` stops delivery and propagation at that node,
    /// and `forward_to` fires fresh sends regardless of `cancel`. A group
    /// whose connected region has no subscriber anywhere incurs no work.
    pub fn send(group: &Group, payload: Payload) {
        if !region_has_subscribers(group) {
            return;
        }
        send_routed(group, payload, &HashSet::new());
    }
}

impl PartialEq for Mailbox {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Mailbox {}

impl Hash for Mailbox {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("buffered", &self.inner.messages.lock().len())
            .finish()
    }
}

fn subscribers(group: &Group) -> Vec<Mailbox> {
    registry()
        .subscriptions
        .lock()
        .get(group)
        .map(|boxes| boxes.iter().cloned().collect())
        .unwrap_or_default()
}

fn region_has_subscribers(group: &Group) -> bool {
    let mut current = Some(group.clone());
    while let Some(ancestor) = current {
        if !subscribers(&ancestor).is_empty() {
            return true;
        }
        current = ancestor.parent();
    }

    let mut frontier = group.children();
    while let Some(descendant) = frontier.pop() {
        if !subscribers(&descendant).is_empty() {
            return true;
        }
        frontier.extend(descendant.children());
    }
    false
}

fn send_routed(group: &Group, payload: Payload, exclude: &HashSet<Group>) {
    if exclude.contains(group) {
        return;
    }

    let policy = group
        .nearest_extension()
        .and_then(|extension| extension.on_message(&payload))
        .unwrap_or_default();

    let payload = match policy.transform {
        Some(transform) => transform(payload),
        None => payload,
    };

    if !policy.cancel {
        for mailbox in subscribers(group) {
            mailbox.deliver(Message {
                group: group.clone(),
                payload: payload.clone(),
            });
        }

        let mut next_exclude = exclude.clone();
        next_exclude.insert(group.clone());

        if let Some(parent) = group.parent() {
            if !exclude.contains(&parent) {
                send_routed(&parent, payload.clone(), &next_exclude);
            }
        }
        for child in group.children() {
            if exclude.contains(&child) {
                continue;
            }
            send_routed(&child, payload.clone(), &next_exclude);
        }
    }

    for target in policy.forward_to {
        let mut forward_exclude = HashSet::new();
        forward_exclude.insert(group.clone());
        send_routed(&target, payload.clone(), &forward_exclude);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::{Mailbox, Message};
    use crate::error::UsageError;
    use crate::extension::{Extension, MessagePolicy, Payload};
    use crate::group::Group;

    fn text(message: &Message) -> String {
        message
            .payload
            .downcast_ref::<String>()
            .cloned()
            .unwrap_or_default()
    }

    struct CountingExtension {
        policies: AtomicU32,
        cancel: bool,
        forward_to: Vec<Group>,
        suffix: Option<&'static str>,
    }

    impl CountingExtension {
        fn new(cancel: bool, forward_to: Vec<Group>, suffix: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                policies: AtomicU32::new(0),
                cancel,
                forward_to,
                suffix,
            })
        }
    }

    impl Extension for CountingExtension {
        fn on_message(&self, content: &Payload) -> Option<MessagePolicy> {
            self.policies.fetch_add(1, Ordering::SeqCst);
            let transform = self.suffix.map(|suffix| {
                let base = content.downcast_ref::<String>().cloned().unwrap_or_default();
                Box::new(move |_payload: Payload| Payload::new(format!("{base}{suffix}")))
                    as crate::extension::Transform
            });
            Some(MessagePolicy {
                cancel: self.cancel,
                forward_to: self.forward_to.clone(),
                transform,
            })
        }

        fn background_worker(&self) -> anyhow::Result<()> {
            // Parked for the life of the process; the bus supervisor owns it.
            weft_sync::Event::new().wait();
            Ok(())
        }
    }

    #[test]
    fn inbox_is_lifo() {
        let group = Group::new("bus_lifo/a").unwrap();
        let mailbox = Mailbox::new();
        mailbox.subscribe(&group);

        Mailbox::send(&group, Payload::new("first".to_string()));
        Mailbox::send(&group, Payload::new("second".to_string()));

        assert_eq!(text(&mailbox.get()), "second");
        assert_eq!(text(&mailbox.get()), "first");
        assert!(mailbox.try_get().is_none());
    }

    #[test]
    fn get_blocks_until_a_message_arrives() {
        let group = Group::new("bus_block/a").unwrap();
        let mailbox = Mailbox::new();
        mailbox.subscribe(&group);

        let consumer = mailbox.clone();
        let handle = std::thread::spawn(move || consumer.get());

        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!handle.is_finished());

        Mailbox::send(&group, Payload::new("late".to_string()));
        assert_eq!(text(&handle.join().unwrap()), "late");
    }

    #[test]
    fn hierarchical_delivery_traverses_the_wildcard_parent_once() {
        let mid = Group::new("bus_tree/a/b/c").unwrap();
        let leaf = Group::new("bus_tree/a/b/c/d").unwrap();

        let mid_box = Mailbox::new();
        mid_box.subscribe(&mid);
        let leaf_box = Mailbox::new();
        leaf_box.subscribe(&leaf);

        Mailbox::send(&leaf, Payload::new("up".to_string()));

        let at_leaf = leaf_box.get();
        assert_eq!(at_leaf.group, leaf);
        assert_eq!(text(&at_leaf), "up");
        assert!(leaf_box.try_get().is_none());

        let at_mid = mid_box.get();
        assert_eq!(at_mid.group, mid);
        assert_eq!(text(&at_mid), "up");
        assert!(mid_box.try_get().is_none());
    }

    #[test]
    fn send_at_a_prefix_fans_out_to_the_subtree() {
        let root = Group::new("bus_fan/a").unwrap();
        let left = Group::new("bus_fan/a/left").unwrap();
        let right = Group::new("bus_fan/a/right").unwrap();

        let left_box = Mailbox::new();
        left_box.subscribe(&left);
        let right_box = Mailbox::new();
        right_box.subscribe(&right);

        Mailbox::send(&root, Payload::new("down".to_string()));

        assert_eq!(text(&left_box.get()), "down");
        assert!(left_box.try_get().is_none());
        assert_eq!(text(&right_box.get()), "down");
        assert!(right_box.try_get().is_none());
    }

    #[test]
    fn unsubscribed_region_incurs_no_work() {
        let silent = Group::new("bus_silent/z").unwrap();
        let extension = CountingExtension::new(false, Vec::new(), None);
        Group::new("bus_silent/...")
            .unwrap()
            .add_extension(extension.clone())
            .unwrap();

        Mailbox::send(&silent, Payload::new("void".to_string()));
        assert_eq!(extension.policies.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancel_suppresses_delivery_but_forwards_still_fire() {
        let origin = Group::new("bus_cancel/a/x").unwrap();
        let elsewhere = Group::new("bus_cancel_target/b").unwrap();

        let origin_box = Mailbox::new();
        origin_box.subscribe(&origin);
        let forward_box = Mailbox::new();
        forward_box.subscribe(&elsewhere);

        let extension = CountingExtension::new(true, vec![elsewhere.clone()], None);
        Group::new("bus_cancel/a/...")
            .unwrap()
            .add_extension(extension.clone())
            .unwrap();

        Mailbox::send(&origin, Payload::new("stop".to_string()));

        assert!(origin_box.try_get().is_none());
        let forwarded = forward_box.get();
        assert_eq!(forwarded.group, elsewhere);
        assert_eq!(text(&forwarded), "stop");
        assert_eq!(extension.policies.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transform_rewrites_content_before_delivery() {
        let group = Group::new("bus_transform/a/x").unwrap();
        let mailbox = Mailbox::new();
        mailbox.subscribe(&group);

        let extension = CountingExtension::new(false, Vec::new(), Some("!"));
        Group::new("bus_transform/a/...")
            .unwrap()
            .add_extension(extension)
            .unwrap();

        Mailbox::send(&group, Payload::new("loud".to_string()));
        assert_eq!(text(&mailbox.get()), "loud!");
    }

    #[test]
    fn second_extension_registration_fails() {
        let group = Group::new("bus_double/a").unwrap();
        group
            .add_extension(CountingExtension::new(false, Vec::new(), None))
            .unwrap();
        let err = group
            .add_extension(CountingExtension::new(false, Vec::new(), None))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<UsageError>(),
            Some(&UsageError::ExtensionAlreadyRegistered(
                "bus_double/a".to_string()
            ))
        );
    }

    #[test]
    fn unsubscribe_stops_deliveries() {
        let group = Group::new("bus_unsub/a").unwrap();
        let mailbox = Mailbox::new();
        mailbox.subscribe(&group);
        Mailbox::send(&group, Payload::new("one".to_string()));
        assert_eq!(text(&mailbox.get()), "one");

        mailbox.unsubscribe(&group);
        Mailbox::send(&group, Payload::new("two".to_string()));
        assert!(mailbox.try_get().is_none());
    }
}
