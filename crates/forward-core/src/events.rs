//! A small, panic-isolating event bus shared by the breaker, rate-limit guard,
//! and forwarder, modeled on the resilience-pattern crates this engine grew out of:
//! a typed event per component plus a `Vec` of listeners that can't take each other down.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// An event emitted by some component of the forwarding engine.
pub trait EngineEvent: Send + Sync + fmt::Debug {
    /// Stable event name, e.g. `"breaker_state_transition"`.
    fn event_type(&self) -> &'static str;
    fn timestamp(&self) -> Instant;
}

pub trait EventListener<E: EngineEvent>: Send + Sync {
    fn on_event(&self, event: &E);
}

pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// A collection of event listeners. Cheap to clone (shares listener `Arc`s).
#[derive(Clone)]
pub struct EventListeners<E: EngineEvent> {
    listeners: Vec<BoxedEventListener<E>>,
}

impl<E: EngineEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Emits to every listener. A panicking listener is caught and logged; the
    /// rest still run, so one broken audit sink can't take the forwarder down.
    pub fn emit(&self, event: &E) {
        for (index, listener) in self.listeners.iter().enumerate() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));
            if let Err(panic_payload) = result {
                let message = panic_payload
                    .downcast_ref::<&'static str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                tracing::warn!(
                    listener_index = index,
                    event_type = event.event_type(),
                    panic_message = %message,
                    "engine event listener panicked"
                );
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: EngineEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// A function-based listener, for tests and small inline wiring.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<E>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: EngineEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Ping(Instant);

    impl EngineEvent for Ping {
        fn event_type(&self) -> &'static str {
            "ping"
        }
        fn timestamp(&self) -> Instant {
            self.0
        }
    }

    #[test]
    fn emits_to_all_listeners_despite_panic() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut listeners: EventListeners<Ping> = EventListeners::new();

        listeners.add(FnListener::new(|_: &Ping| panic!("boom")));
        let seen2 = Arc::clone(&seen);
        listeners.add(FnListener::new(move |_: &Ping| {
            seen2.fetch_add(1, Ordering::SeqCst);
        }));

        listeners.emit(&Ping(Instant::now()));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
