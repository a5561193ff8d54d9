use std::thread;
use std::time::Duration;

/// One atom of a trigger encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerAtom {
    /// Numeric atom: trigger ids and nanosecond counts.
    Int(u64),
    /// Textual atom, for trigger kinds that carry names.
    Str(String),
}

/// A wakeup condition understood by the timer capability.
///
/// New trigger kinds are authored by supplying a distinct id and encoding.
pub trait Trigger {
    /// Discriminating id; always the first encoded atom.
    fn id(&self) -> u8;

    /// Full encoding handed to the capability: `[id, payload…]`.
    fn encode(&self) -> Vec<TriggerAtom>;
}

/// Fires once the given duration has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeTrigger {
    duration: Duration,
}

impl TimeTrigger {
    /// Trigger id of the time trigger kind.
    pub const ID: u8 = 0x00;

    /// Trigger firing after `duration`.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl Trigger for TimeTrigger {
    fn id(&self) -> u8 {
        Self::ID
    }

    fn encode(&self) -> Vec<TriggerAtom> {
        let nanos = u64::try_from(self.duration.as_nanos()).unwrap_or(u64::MAX);
        vec![TriggerAtom::Int(u64::from(Self::ID)), TriggerAtom::Int(nanos)]
    }
}

/// Suspend the calling thread until `trigger` fires.
pub fn wait_until_trigger(trigger: &dyn Trigger) {
    wait_for_event(&trigger.encode());
}

// Timer capability shim: decodes a trigger encoding and parks the caller.
fn wait_for_event(encoded: &[TriggerAtom]) {
    match encoded {
        [TriggerAtom::Int(id), TriggerAtom::Int(nanos)]
            if *id == u64::from(TimeTrigger::ID) =>
        {
            thread::sleep(Duration::from_nanos(*nanos));
        }
        _ => tracing::warn!("unknown trigger encoding, firing immediately"),
    }
}

/// Sleep for `duration` via the time trigger.
pub fn sleep(duration: Duration) {
    wait_until_trigger(&TimeTrigger::new(duration));
}

/// Park the calling thread forever.
pub fn sleep_indefinitely() -> ! {
    loop {
        sleep(Duration::from_secs(3600));
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{TimeTrigger, Trigger, TriggerAtom, sleep};

    #[test]
    fn time_trigger_encodes_id_then_nanos() {
        let trigger = TimeTrigger::new(Duration::from_millis(1500));
        assert_eq!(trigger.id(), 0x00);
        assert_eq!(
            trigger.encode(),
            vec![TriggerAtom::Int(0), TriggerAtom::Int(1_500_000_000)]
        );
    }

    #[test]
    fn sleep_waits_out_the_trigger() {
        let started = Instant::now();
        sleep(Duration::from_millis(50));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn unknown_trigger_kinds_fire_immediately() {
        struct NamedTrigger;

        impl Trigger for NamedTrigger {
            fn id(&self) -> u8 {
                0x7f
            }

            fn encode(&self) -> Vec<TriggerAtom> {
                vec![
                    TriggerAtom::Int(u64::from(self.id())),
                    TriggerAtom::Str("unsupported".to_string()),
                ]
            }
        }

        super::wait_until_trigger(&NamedTrigger);
    }
}
