//! Listener plumbing for primitive-level events
//!
//! Primitives republish decoded session events to application listeners.
//! Listeners are identified by their `Arc` allocation, so the same `Arc`
//! must be passed to `remove` that was passed to `add`.

use parking_lot::RwLock;
use std::sync::Arc;

/// Receiver of primitive events
pub trait Listener<E>: Send + Sync {
    /// Handle one event
    fn event(&self, event: &E);
}

impl<E, F> Listener<E> for F
where
    F: Fn(&E) + Send + Sync,
{
    fn event(&self, event: &E) {
        self(event)
    }
}

/// Check whether two listener handles are the same registration
pub fn same_listener<E>(a: &Arc<dyn Listener<E>>, b: &Arc<dyn Listener<E>>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Set of listeners with snapshot delivery
///
/// `notify` clones the current set before calling out, so listeners may
/// add or remove registrations from inside a callback.
pub struct ListenerRegistry<E> {
    listeners: RwLock<Vec<Arc<dyn Listener<E>>>>,
}

impl<E> ListenerRegistry<E> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Add a listener
    ///
    /// Returns `true` if the registry was empty before the call.
    pub fn add(&self, listener: Arc<dyn Listener<E>>) -> bool {
        let mut listeners = self.listeners.write();
        let was_empty = listeners.is_empty();
        listeners.push(listener);
        was_empty
    }

    /// Remove a listener
    ///
    /// Returns `true` if a listener was removed and the registry is now empty.
    pub fn remove(&self, listener: &Arc<dyn Listener<E>>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        before != listeners.len() && listeners.is_empty()
    }

    /// Check whether a listener is registered
    pub fn contains(&self, listener: &Arc<dyn Listener<E>>) -> bool {
        self.listeners.read().iter().any(|l| same_listener(l, listener))
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Check whether no listeners are registered
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Deliver an event to every registered listener
    pub fn notify(&self, event: &E) {
        let snapshot = self.listeners.read().clone();
        for listener in snapshot {
            listener.event(event);
        }
    }
}

impl<E> Default for ListenerRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_add_reports_first_listener() {
        let registry = ListenerRegistry::<u32>::new();
        let a: Arc<dyn Listener<u32>> = Arc::new(|_: &u32| {});
        let b: Arc<dyn Listener<u32>> = Arc::new(|_: &u32| {});

        assert!(registry.add(a.clone()));
        assert!(!registry.add(b.clone()));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_reports_last_listener() {
        let registry = ListenerRegistry::<u32>::new();
        let a: Arc<dyn Listener<u32>> = Arc::new(|_: &u32| {});
        let b: Arc<dyn Listener<u32>> = Arc::new(|_: &u32| {});
        registry.add(a.clone());
        registry.add(b.clone());

        assert!(!registry.remove(&a));
        // Removing an unknown listener never reports emptiness
        assert!(!registry.remove(&a));
        assert!(registry.remove(&b));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_notify_reaches_every_listener() {
        let registry = ListenerRegistry::<u32>::new();
        let total = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let total = total.clone();
            registry.add(Arc::new(move |e: &u32| {
                total.fetch_add(*e as usize, Ordering::SeqCst);
            }));
        }
        registry.notify(&2);
        assert_eq!(total.load(Ordering::SeqCst), 6);
    }
}
