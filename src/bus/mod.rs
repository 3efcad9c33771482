// SPDX-License-Identifier: MIT

//! In-process event bus
//!
//! Listeners subscribe to exact event names. `emit` dispatches synchronously
//! in subscription order and returns once every listener has run. Events
//! with no listeners are dropped.

pub mod events;

pub use events::{timer_event, BusEvent, TimerPhase};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Callback invoked for each matching event
pub type Listener = Arc<dyn Fn(&BusEvent) + Send + Sync>;

struct Entry {
    id: u64,
    listener: Listener,
    once: bool,
}

#[derive(Default)]
struct BusInner {
    listeners: Mutex<HashMap<String, Vec<Entry>>>,
    next_id: AtomicU64,
}

impl BusInner {
    fn remove(&self, name: &str, id: u64) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(entries) = listeners.get_mut(name) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(name);
        }
        removed
    }
}

/// Handle returned by `on`/`once`; call `unsubscribe` to stop listening
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<BusInner>,
    name: String,
    id: u64,
}

impl Subscription {
    /// Remove the listener. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.bus.upgrade() {
            Some(inner) => inner.remove(&self.name, self.id),
            None => false,
        }
    }

    pub fn event_name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for BusInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusInner").finish_non_exhaustive()
    }
}

/// Publish/subscribe channel shared by the timer manager and the runner.
///
/// Cloning is cheap and every clone talks to the same listener table.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every event named `name`
    pub fn on<F>(&self, name: impl Into<String>, listener: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.subscribe(name.into(), Arc::new(listener), false)
    }

    /// Subscribe to the next event named `name` only
    pub fn once<F>(&self, name: impl Into<String>, listener: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.subscribe(name.into(), Arc::new(listener), true)
    }

    fn subscribe(&self, name: String, listener: Listener, once: bool) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .entry(name.clone())
            .or_default()
            .push(Entry { id, listener, once });

        Subscription {
            bus: Arc::downgrade(&self.inner),
            name,
            id,
        }
    }

    /// Dispatch `event` to the listeners registered for its name.
    ///
    /// The listener list is snapshotted before dispatch, so listeners may
    /// subscribe, unsubscribe or emit from inside their callback. Panics in a
    /// listener propagate to the caller.
    pub fn emit(&self, event: BusEvent) {
        let name = event.name();
        let snapshot: Vec<Listener> = {
            let mut listeners = self.inner.listeners.lock();
            let Some(entries) = listeners.get_mut(&name) else {
                log::trace!("No listeners for {}", name);
                return;
            };
            let snapshot = entries.iter().map(|e| e.listener.clone()).collect();
            entries.retain(|e| !e.once);
            if entries.is_empty() {
                listeners.remove(&name);
            }
            snapshot
        };

        for listener in snapshot {
            listener(&event);
        }
    }

    /// Number of listeners currently registered for `name`
    pub fn listener_count(&self, name: &str) -> usize {
        self.inner
            .listeners
            .lock()
            .get(name)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// Drop every listener
    pub fn clear(&self) {
        self.inner.listeners.lock().clear();
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("event_names", &self.inner.listeners.lock().len())
            .finish()
    }
}
