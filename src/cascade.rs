//! Interrupt cascade: `start`/`interrupt`/`end` events plus a mutex-guarded
//! `interrupted` flag that every event-driven stage composes in.
//!
//! The ordering guarantee this exists to provide: a downstream stage must
//! never observe a frame produced after an interrupt before it observes the
//! `interrupt` event itself. That's why `interrupt()` clears the owning
//! stage's output queue *and* flips the flag while holding the same lock,
//! then fires the event only once both have happened.

use std::sync::{Arc, Mutex};

use crate::event_bus::{EventBus, EventPayload};

/// Event name fired when a stage begins producing output for a new turn.
pub const EVENT_START: &str = "start";
/// Event name fired when a stage's in-flight output is interrupted.
pub const EVENT_INTERRUPT: &str = "interrupt";
/// Event name fired when a stage's output for the current turn completes.
pub const EVENT_END: &str = "end";

/// Shared interrupt state and cascade-event plumbing for a stage.
pub struct InterruptCascade {
    bus: Arc<EventBus>,
    interrupted: Mutex<bool>,
}

impl InterruptCascade {
    /// Build a cascade that fires on `bus`.
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            interrupted: Mutex::new(false),
        }
    }

    /// Begin a new turn: clear the interrupted flag and fire `start`.
    pub fn start(&self) {
        *self.interrupted.lock().expect("cascade mutex poisoned") = false;
        self.bus.trigger(EVENT_START, &EventPayload::empty());
    }

    /// Interrupt the current turn. `clear_output` runs while the flag is
    /// held, so any code that checks `is_interrupted()` under its own lock
    /// can't race past a partially-applied interrupt.
    pub fn interrupt(&self, clear_output: impl FnOnce()) {
        {
            let mut flag = self.interrupted.lock().expect("cascade mutex poisoned");
            *flag = true;
            clear_output();
        }
        self.bus.trigger(EVENT_INTERRUPT, &EventPayload::empty());
    }

    /// End the current turn normally and fire `end`.
    pub fn end(&self) {
        self.bus.trigger(EVENT_END, &EventPayload::empty());
    }

    /// Whether the current turn has been interrupted.
    pub fn is_interrupted(&self) -> bool {
        *self.interrupted.lock().expect("cascade mutex poisoned")
    }

    /// Register a handler for `interrupt` so downstream stages can cascade
    /// the same interrupt onward.
    pub fn on_interrupt(&self, handler: impl Fn(&EventPayload) + Send + Sync + 'static) {
        self.bus.on(EVENT_INTERRUPT, handler);
    }
}
