//! Synchronous, reentrant-safe event dispatch shared by every stage.
//!
//! Handlers are invoked in registration order on the caller's own task —
//! `trigger` never hops to another task. A handler that registers a new
//! handler for the same event while it runs does not affect the dispatch
//! already in progress, since the handler list is snapshotted before
//! iteration begins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Handler = Arc<dyn Fn(&EventPayload) + Send + Sync>;

/// Data carried by a triggered event.
#[derive(Debug, Clone, Default)]
pub struct EventPayload {
    /// Free-form string fields, keyed by name (e.g. `"old"`, `"new"`).
    pub strings: HashMap<String, String>,
    /// Free-form float fields, keyed by name (e.g. elapsed seconds).
    pub numbers: HashMap<String, f64>,
}

impl EventPayload {
    /// An empty payload, for events that carry no data.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builder-style setter for a string field.
    pub fn with_string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.strings.insert(key.into(), value.into());
        self
    }

    /// Builder-style setter for a numeric field.
    pub fn with_number(mut self, key: impl Into<String>, value: f64) -> Self {
        self.numbers.insert(key.into(), value);
        self
    }

    /// Read a string field, if present.
    pub fn string(&self, key: &str) -> Option<&str> {
        self.strings.get(key).map(String::as_str)
    }

    /// Read a numeric field, if present.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.numbers.get(key).copied()
    }
}

/// An ordered map of event name to handler list, dispatched synchronously.
#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<String, Vec<Handler>>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `event`. Handlers for the same event run in
    /// registration order.
    pub fn on(&self, event: &str, handler: impl Fn(&EventPayload) + Send + Sync + 'static) {
        let mut handlers = self.handlers.lock().expect("event bus mutex poisoned");
        handlers
            .entry(event.to_owned())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Invoke every handler registered for `event`, in order, on the
    /// caller's own stack. Missing handlers are a no-op.
    pub fn trigger(&self, event: &str, payload: &EventPayload) {
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.lock().expect("event bus mutex poisoned");
            match handlers.get(event) {
                Some(list) => list.clone(),
                None => return,
            }
        };
        for handler in snapshot {
            handler(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn trigger_invokes_handlers_in_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        bus.on("tick", move |_| o1.lock().unwrap().push(1));
        bus.on("tick", move |_| o2.lock().unwrap().push(2));
        bus.trigger("tick", &EventPayload::empty());
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn trigger_on_missing_event_is_noop() {
        let bus = EventBus::new();
        bus.trigger("nothing", &EventPayload::empty());
    }

    #[test]
    fn payload_round_trips_fields() {
        let payload = EventPayload::empty()
            .with_string("old", "user")
            .with_string("new", "assistant")
            .with_number("elapsed", 1.5);
        assert_eq!(payload.string("old"), Some("user"));
        assert_eq!(payload.string("new"), Some("assistant"));
        assert_eq!(payload.number("elapsed"), Some(1.5));
        assert_eq!(payload.string("missing"), None);
    }

    #[test]
    fn reentrant_registration_does_not_affect_in_flight_dispatch() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let bus_inner = bus.clone();
        let count_inner = count.clone();
        bus.on("tick", move |_| {
            count_inner.fetch_add(1, Ordering::SeqCst);
            let c = count_inner.clone();
            bus_inner.on("tick", move |_| {
                c.fetch_add(100, Ordering::SeqCst);
            });
        });
        bus.trigger("tick", &EventPayload::empty());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        bus.trigger("tick", &EventPayload::empty());
        assert_eq!(count.load(Ordering::SeqCst), 102);
    }
}
