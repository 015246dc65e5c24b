//! Interest-based listener registry.
//!
//! Screens subscribe to event types (or the wildcard) and to the boolean
//! connectivity signal. Registration hands back a [`Subscription`] handle;
//! removal goes through the handle, so callers never need to retain the
//! original closure reference.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::protocol::{events, Frame};

type EventCallback = Arc<dyn Fn(serde_json::Value) + Send + Sync>;
type StateCallback = Arc<dyn Fn(bool) + Send + Sync>;

struct EventListener {
    id: u64,
    callback: EventCallback,
}

struct StateListener {
    id: u64,
    callback: StateCallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SubscriptionKind {
    Event(String),
    ConnectionState,
}

/// Disposable handle returned by registration.
///
/// Cancelling an already-removed (or cleared) subscription is a no-op.
pub struct Subscription {
    id: u64,
    kind: SubscriptionKind,
    registry: Arc<RegistryInner>,
}

impl Subscription {
    /// Remove the associated listener.
    pub fn cancel(self) {
        match &self.kind {
            SubscriptionKind::Event(event_type) => {
                self.registry.remove_event_listener(event_type, self.id);
            }
            SubscriptionKind::ConnectionState => {
                self.registry.remove_state_listener(self.id);
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

struct RegistryInner {
    next_id: AtomicU64,
    /// event-type -> insertion-ordered listeners; `"*"` holds the wildcard.
    listeners: DashMap<String, Vec<EventListener>>,
    state_listeners: Mutex<Vec<StateListener>>,
}

impl RegistryInner {
    fn remove_event_listener(&self, event_type: &str, id: u64) {
        if let Some(mut entry) = self.listeners.get_mut(event_type) {
            let before = entry.len();
            entry.retain(|l| l.id != id);
            if entry.len() < before {
                tracing::debug!(event_type = %event_type, listener_id = id, "Listener removed");
            }
            if entry.is_empty() {
                drop(entry);
                self.listeners.remove(event_type);
            }
        }
    }

    fn remove_state_listener(&self, id: u64) {
        let mut listeners = self.state_listeners.lock().unwrap();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        if listeners.len() < before {
            tracing::debug!(listener_id = id, "Connection-state listener removed");
        }
    }
}

/// Registry of typed, wildcard, and connection-state listeners.
pub struct ListenerRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                next_id: AtomicU64::new(1),
                listeners: DashMap::new(),
                state_listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a callback for an event type. `events::WILDCARD` subscribes
    /// to every message; wildcard callbacks receive the full envelope
    /// instead of the bare payload.
    pub fn on(
        &self,
        event_type: impl Into<String>,
        callback: impl Fn(serde_json::Value) + Send + Sync + 'static,
    ) -> Subscription {
        let event_type = event_type.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        self.inner
            .listeners
            .entry(event_type.clone())
            .or_default()
            .push(EventListener {
                id,
                callback: Arc::new(callback),
            });

        tracing::debug!(event_type = %event_type, listener_id = id, "Listener registered");

        Subscription {
            id,
            kind: SubscriptionKind::Event(event_type),
            registry: self.inner.clone(),
        }
    }

    /// Register a callback for connectivity transitions.
    pub fn on_connection_change(
        &self,
        callback: impl Fn(bool) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .state_listeners
            .lock()
            .unwrap()
            .push(StateListener {
                id,
                callback: Arc::new(callback),
            });

        tracing::debug!(listener_id = id, "Connection-state listener registered");

        Subscription {
            id,
            kind: SubscriptionKind::ConnectionState,
            registry: self.inner.clone(),
        }
    }

    /// Dispatch a frame: exact-type listeners receive the payload in
    /// registration order, then wildcard listeners receive the full
    /// envelope. A panicking callback is isolated and logged; the rest
    /// still run. Returns the number of panicking callbacks.
    pub fn dispatch(&self, frame: &Frame) -> usize {
        let mut panics = 0;

        let exact: Vec<(u64, EventCallback)> = self
            .inner
            .listeners
            .get(&frame.event_type)
            .map(|entry| entry.iter().map(|l| (l.id, l.callback.clone())).collect())
            .unwrap_or_default();
        for (id, callback) in exact {
            let payload = frame.data.clone();
            if catch_unwind(AssertUnwindSafe(|| callback(payload))).is_err() {
                panics += 1;
                tracing::error!(
                    event_type = %frame.event_type,
                    listener_id = id,
                    "Listener panicked while handling message"
                );
            }
        }

        let wildcard: Vec<(u64, EventCallback)> = self
            .inner
            .listeners
            .get(events::WILDCARD)
            .map(|entry| entry.iter().map(|l| (l.id, l.callback.clone())).collect())
            .unwrap_or_default();
        if !wildcard.is_empty() {
            let envelope = frame.envelope();
            for (id, callback) in wildcard {
                let envelope = envelope.clone();
                if catch_unwind(AssertUnwindSafe(|| callback(envelope))).is_err() {
                    panics += 1;
                    tracing::error!(
                        event_type = %frame.event_type,
                        listener_id = id,
                        "Wildcard listener panicked while handling message"
                    );
                }
            }
        }

        panics
    }

    /// Notify connection-state listeners, in registration order, with the
    /// same per-callback panic isolation as [`dispatch`](Self::dispatch).
    pub fn notify_connection(&self, connected: bool) -> usize {
        let listeners: Vec<(u64, StateCallback)> = self
            .inner
            .state_listeners
            .lock()
            .unwrap()
            .iter()
            .map(|l| (l.id, l.callback.clone()))
            .collect();

        let mut panics = 0;
        for (id, callback) in listeners {
            if catch_unwind(AssertUnwindSafe(|| callback(connected))).is_err() {
                panics += 1;
                tracing::error!(
                    connected,
                    listener_id = id,
                    "Connection-state listener panicked"
                );
            }
        }
        panics
    }

    /// Remove every listener of every kind.
    pub fn clear(&self) {
        self.inner.listeners.clear();
        self.inner.state_listeners.lock().unwrap().clear();
    }

    /// Number of listeners registered for an exact event type.
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.inner
            .listeners
            .get(event_type)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    /// Number of connection-state listeners.
    pub fn state_listener_count(&self) -> usize {
        self.inner.state_listeners.lock().unwrap().len()
    }

    /// Whether no listener of any kind remains.
    pub fn is_empty(&self) -> bool {
        self.inner.listeners.is_empty() && self.state_listener_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn frame(event_type: &str) -> Frame {
        Frame::new(event_type, json!({"k": "v"}))
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let registry = ListenerRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        let _a = registry.on("status_update", move |_| o.lock().unwrap().push("first"));
        let o = order.clone();
        let _b = registry.on("status_update", move |_| o.lock().unwrap().push("second"));

        registry.dispatch(&frame("status_update"));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_cancel_leaves_other_listener() {
        let registry = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        let first = registry.on("eta_update", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let h = hits.clone();
        let _second = registry.on("eta_update", move |_| {
            h.fetch_add(10, Ordering::SeqCst);
        });

        first.cancel();
        registry.dispatch(&frame("eta_update"));

        assert_eq!(hits.load(Ordering::SeqCst), 10);
        assert_eq!(registry.listener_count("eta_update"), 1);
    }

    #[test]
    fn test_cancel_after_clear_is_noop() {
        let registry = ListenerRegistry::new();
        let sub = registry.on("status_update", |_| {});
        let state_sub = registry.on_connection_change(|_| {});

        registry.clear();
        sub.cancel();
        state_sub.cancel();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_wildcard_receives_envelope() {
        let registry = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(None));

        let s = seen.clone();
        let _sub = registry.on(events::WILDCARD, move |value| {
            *s.lock().unwrap() = Some(value);
        });

        registry.dispatch(&Frame::new("provider_location", json!({"lat": 1.0})));

        let value = seen.lock().unwrap().take().unwrap();
        assert_eq!(value["type"], "provider_location");
        assert_eq!(value["data"]["lat"], 1.0);
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let registry = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let _bad = registry.on("status_update", |_| panic!("listener bug"));
        let h = hits.clone();
        let _good = registry.on("status_update", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        let panics = registry.dispatch(&frame("status_update"));
        assert_eq!(panics, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_without_listeners_is_noop() {
        let registry = ListenerRegistry::new();
        assert_eq!(registry.dispatch(&frame("nobody_cares")), 0);
    }

    #[test]
    fn test_connection_state_listeners() {
        let registry = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        let sub = registry.on_connection_change(move |connected| {
            s.lock().unwrap().push(connected);
        });

        registry.notify_connection(true);
        registry.notify_connection(false);
        sub.cancel();
        registry.notify_connection(true);

        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
        assert_eq!(registry.state_listener_count(), 0);
    }
}
