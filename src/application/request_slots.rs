// Last-write-wins request slots keyed by request context
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Handed out when a request starts; needed to publish its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub key: String,
    pub generation: u64,
    pub fingerprint: String,
}

struct Slot {
    generation: u64,
    fingerprint: String,
    in_flight: usize,
}

/// One slot per request context (a browser session, say). Starting a request
/// makes it the authoritative one for its context; a result from an older
/// request is dropped unless it was started with the same parameters.
///
/// A slot only lives while one of its requests is running.
#[derive(Default)]
pub struct RequestSlots {
    next_generation: AtomicU64,
    slots: Mutex<HashMap<String, Slot>>,
}

/// Keeps a request counted as running until dropped, including when the
/// request future is cancelled.
pub struct InFlight<'a> {
    slots: &'a RequestSlots,
    ticket: &'a Ticket,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.slots.finish(self.ticket);
    }
}

impl RequestSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, key: &str, fingerprint: &str) -> Ticket {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
            generation,
            fingerprint: fingerprint.to_string(),
            in_flight: 0,
        });
        slot.generation = generation;
        slot.fingerprint = fingerprint.to_string();
        slot.in_flight += 1;
        Ticket {
            key: key.to_string(),
            generation,
            fingerprint: fingerprint.to_string(),
        }
    }

    /// Guard for the lifetime of the request started with `ticket`.
    pub fn hold<'a>(&'a self, ticket: &'a Ticket) -> InFlight<'a> {
        InFlight { slots: self, ticket }
    }

    /// Whether no request with other parameters started after `ticket`.
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .get(&ticket.key)
            .is_none_or(|s| s.generation == ticket.generation || s.fingerprint == ticket.fingerprint)
    }

    /// Whether the result of `ticket` may be shown.
    pub fn publish(&self, ticket: &Ticket) -> bool {
        if self.is_current(ticket) {
            return true;
        }
        tracing::info!(
            context = %ticket.key,
            generation = ticket.generation,
            "discarding stale result"
        );
        false
    }

    fn finish(&self, ticket: &Ticket) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = slots.get_mut(&ticket.key) {
            slot.in_flight = slot.in_flight.saturating_sub(1);
            if slot.in_flight == 0 {
                slots.remove(&ticket.key);
            }
        }
    }

    /// Contexts with a request still running.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_request_wins_regardless_of_completion_order() {
        let slots = RequestSlots::new();
        let old = slots.begin("session", "a");
        let new = slots.begin("session", "b");

        assert!(slots.publish(&new));
        assert!(!slots.publish(&old));
    }

    #[test]
    fn test_repeat_of_current_parameters_may_publish() {
        let slots = RequestSlots::new();
        let first = slots.begin("s", "same");
        let _second = slots.begin("s", "same");
        assert!(slots.is_current(&first));
        assert!(slots.publish(&first));
    }

    #[test]
    fn test_contexts_are_independent() {
        let slots = RequestSlots::new();
        let a = slots.begin("a", "x");
        let _b = slots.begin("b", "y");
        assert!(slots.publish(&a));
    }

    #[test]
    fn test_finished_contexts_are_evicted() {
        let slots = RequestSlots::new();
        for i in 0..1000 {
            let ticket = slots.begin(&format!("session-{}", i), "x");
            let _running = slots.hold(&ticket);
            assert_eq!(slots.len(), 1);
        }
        assert_eq!(slots.len(), 0);
    }

    #[test]
    fn test_slot_outlives_older_request_while_newer_runs() {
        let slots = RequestSlots::new();
        let old = slots.begin("s", "a");
        let new = slots.begin("s", "b");
        drop(slots.hold(&old));

        // The newer request still owns the context.
        assert_eq!(slots.len(), 1);
        assert!(!slots.is_current(&old));
        let running = slots.hold(&new);
        assert!(slots.publish(&new));
        drop(running);
        assert_eq!(slots.len(), 0);
    }
}
