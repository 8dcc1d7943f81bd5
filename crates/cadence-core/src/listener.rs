//! # Listener Registry
//!
//! Keeps the set of parties interested in a coordinator's updates.
//!
//! ## Notification Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   registry (behind the coordinator's lock)                             │
//! │   ┌──────────────────────────────┐                                     │
//! │   │ id-1 → (callback, ctx)       │   snapshot()   ┌─────────────────┐  │
//! │   │ id-2 → (callback, None)      │──────────────▶ │ ListenerSnapshot│  │
//! │   │ id-3 → (callback, ctx)       │                │ [cb1, cb2, cb3] │  │
//! │   └──────────────────────────────┘                └────────┬────────┘  │
//! │                                      lock released here    │           │
//! │                                                            ▼           │
//! │                                                     notify_all()       │
//! │                                                                         │
//! │  A callback that unsubscribes itself (or another listener) mutates the │
//! │  registry, never the snapshot being iterated.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::types::ListenerId;

/// A listener callback. Takes no arguments and must not panic.
pub type ListenerCallback = Arc<dyn Fn() + Send + Sync>;

struct Listener<C> {
    callback: ListenerCallback,
    context: Option<C>,
}

// =============================================================================
// Listener Registry
// =============================================================================

/// Set of listeners keyed by subscription id.
///
/// `C` is an opaque per-listener context the registry stores and returns but
/// never inspects.
pub struct ListenerRegistry<C> {
    listeners: HashMap<ListenerId, Listener<C>>,
}

impl<C> Default for ListenerRegistry<C> {
    fn default() -> Self {
        ListenerRegistry {
            listeners: HashMap::new(),
        }
    }
}

impl<C> fmt::Debug for ListenerRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("len", &self.listeners.len())
            .finish()
    }
}

impl<C> ListenerRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener and returns its id.
    pub fn add(&mut self, callback: ListenerCallback, context: Option<C>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.insert(id, Listener { callback, context });
        id
    }

    /// Removes a listener.
    ///
    /// Returns true only when this removal emptied the registry. Removing an
    /// unknown id returns false.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some() && self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Contexts of all listeners that registered one.
    pub fn contexts(&self) -> impl Iterator<Item = &C> + '_ {
        self.listeners
            .values()
            .filter_map(|listener| listener.context.as_ref())
    }

    /// Copies the current callbacks so they can run after the caller releases
    /// any lock guarding the registry.
    pub fn snapshot(&self) -> ListenerSnapshot {
        ListenerSnapshot {
            callbacks: self
                .listeners
                .values()
                .map(|listener| listener.callback.clone())
                .collect(),
        }
    }

    /// Notifies every listener registered at the time of the call.
    pub fn notify_all(&self) {
        self.snapshot().notify_all();
    }
}

// =============================================================================
// Listener Snapshot
// =============================================================================

/// Immutable copy of the callbacks registered at one instant.
#[derive(Clone, Default)]
pub struct ListenerSnapshot {
    callbacks: Vec<ListenerCallback>,
}

impl ListenerSnapshot {
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Invokes every callback exactly once.
    pub fn notify_all(&self) {
        for callback in &self.callbacks {
            callback();
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn counter() -> (Arc<AtomicUsize>, ListenerCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let cb_count = count.clone();
        let callback: ListenerCallback = Arc::new(move || {
            cb_count.fetch_add(1, Ordering::SeqCst);
        });
        (count, callback)
    }

    #[test]
    fn test_add_and_remove() {
        let mut registry: ListenerRegistry<()> = ListenerRegistry::new();
        let (_, cb) = counter();
        let a = registry.add(cb.clone(), None);
        let b = registry.add(cb, None);
        assert_eq!(registry.len(), 2);

        assert!(!registry.remove(a));
        assert!(!registry.remove(a), "second removal is a no-op");
        assert!(registry.remove(b), "last removal empties the registry");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_contexts_skip_absent() {
        let mut registry = ListenerRegistry::new();
        let (_, cb) = counter();
        registry.add(cb.clone(), Some("sensor.temperature"));
        registry.add(cb.clone(), None);
        registry.add(cb, Some("sensor.humidity"));

        let mut contexts: Vec<_> = registry.contexts().copied().collect();
        contexts.sort();
        assert_eq!(contexts, vec!["sensor.humidity", "sensor.temperature"]);
    }

    #[test]
    fn test_notify_all_fires_each_once() {
        let mut registry: ListenerRegistry<()> = ListenerRegistry::new();
        let (first, cb1) = counter();
        let (second, cb2) = counter();
        registry.add(cb1, None);
        registry.add(cb2, None);

        registry.notify_all();
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_snapshot_survives_self_removal() {
        let registry: Arc<Mutex<ListenerRegistry<()>>> = Arc::new(Mutex::new(ListenerRegistry::new()));
        let fired = Arc::new(AtomicUsize::new(0));
        let own_id: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let cb_registry = registry.clone();
        let cb_fired = fired.clone();
        let cb_id = own_id.clone();
        let self_removing: ListenerCallback = Arc::new(move || {
            cb_fired.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *cb_id.lock().unwrap() {
                cb_registry.lock().unwrap().remove(id);
            }
        });

        let (other, other_cb) = counter();
        {
            let mut guard = registry.lock().unwrap();
            let id = guard.add(self_removing, None);
            *own_id.lock().unwrap() = Some(id);
            guard.add(other_cb, None);
        }

        let snapshot = registry.lock().unwrap().snapshot();
        snapshot.notify_all();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(other.load(Ordering::SeqCst), 1);
        assert_eq!(registry.lock().unwrap().len(), 1);
    }
}
