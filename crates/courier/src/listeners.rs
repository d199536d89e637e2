//! Error listener registry.
//!
//! Listeners are notified once per failed request, in registration order,
//! with the error and its [`ErrorKind`]. Each registration returns a
//! [`Subscription`] that removes exactly that listener, regardless of what
//! else was removed in between.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::error::{ErrorKind, RequestError, classify};

new_key_type! {
    /// Identifies one registered error listener.
    pub struct ListenerId;
}

/// Callback notified of failed requests.
pub type ErrorListener = Arc<dyn Fn(&RequestError, ErrorKind) + Send + Sync>;

#[derive(Default)]
struct Registry {
    listeners: SlotMap<ListenerId, ErrorListener>,
    /// Registration order; slot iteration order is not stable across removals.
    order: Vec<ListenerId>,
}

impl Registry {
    fn remove(&mut self, id: ListenerId) -> bool {
        if self.listeners.remove(id).is_some() {
            self.order.retain(|entry| *entry != id);
            true
        } else {
            false
        }
    }
}

/// An ordered set of error listeners.
///
/// Cheap to clone; clones share the same listeners.
#[derive(Clone, Default)]
pub struct ErrorListeners {
    registry: Arc<Mutex<Registry>>,
}

impl ErrorListeners {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener at the end of the notification order.
    pub fn add<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RequestError, ErrorKind) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = registry.listeners.insert(Arc::new(listener));
        registry.order.push(id);
        tracing::trace!(target: "courier::listeners", count = registry.order.len(), "error listener added");
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn remove(&self, id: ListenerId) -> bool {
        self.registry.lock().remove(id)
    }

    /// Remove every listener.
    pub fn clear(&self) {
        let mut registry = self.registry.lock();
        registry.listeners.clear();
        registry.order.clear();
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.registry.lock().order.len()
    }

    /// Check if no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Classify `error` and hand it to every listener in order.
    ///
    /// Listeners run outside the registry lock, so they may register or
    /// unsubscribe; such changes take effect from the next failure. A panic in
    /// a listener is not caught.
    pub fn notify(&self, error: &RequestError) -> ErrorKind {
        let kind = classify(error);
        let snapshot: Vec<ErrorListener> = {
            let registry = self.registry.lock();
            registry
                .order
                .iter()
                .filter_map(|id| registry.listeners.get(*id).cloned())
                .collect()
        };
        tracing::debug!(target: "courier::listeners", %kind, listeners = snapshot.len(), "notifying error listeners");
        for listener in snapshot {
            listener(error, kind);
        }
        kind
    }
}

impl fmt::Debug for ErrorListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorListeners")
            .field("count", &self.len())
            .finish()
    }
}

/// Returned by [`ErrorListeners::add`]; removes that listener when asked.
///
/// Dropping a subscription leaves the listener registered.
#[derive(Clone, Debug)]
pub struct Subscription {
    id: ListenerId,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// The listener's identifier.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Remove the listener.
    ///
    /// Returns `true` if it was still registered. Calling it again, or after
    /// the registry is gone, does nothing.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.lock().remove(self.id),
            None => false,
        }
    }
}
