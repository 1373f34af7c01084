//! Ordered listener registries.
//!
//! Listeners are invoked in registration order. Dispatch clones the current
//! list out of the lock first, so a listener may register or remove
//! listeners (including itself) without deadlocking; such changes take
//! effect from the next dispatch.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;

use crate::identifiers::ListenerId;

use super::state::ConnectionState;

// ============================================================================
// Registry
// ============================================================================

/// Ordered list of listeners of one kind.
pub(crate) struct Registry<L: ?Sized> {
    entries: Mutex<Vec<(ListenerId, Arc<L>)>>,
}

impl<L: ?Sized> Default for Registry<L> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<L: ?Sized> Registry<L> {
    /// Appends a listener and returns its handle.
    pub fn add(&self, listener: Arc<L>) -> ListenerId {
        let id = ListenerId::next();
        self.entries.lock().push((id, listener));
        id
    }

    /// Removes a listener. Returns `true` if it was registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Removes every listener.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Clones the current listeners out of the lock.
    pub fn snapshot(&self) -> Vec<Arc<L>> {
        self.entries
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

// ============================================================================
// Listeners
// ============================================================================

/// Both listener registries of a connection.
#[derive(Default)]
pub(crate) struct Listeners {
    pub state: Registry<dyn Fn(ConnectionState, ConnectionState) + Send + Sync>,
    pub data: Registry<dyn Fn(&str) + Send + Sync>,
}

impl Listeners {
    /// Removes a listener from whichever registry holds it.
    pub fn remove(&self, id: ListenerId) -> bool {
        self.state.remove(id) || self.data.remove(id)
    }

    /// Drops every listener.
    pub fn clear(&self) {
        self.state.clear();
        self.data.clear();
    }

    /// Notifies state listeners of `old -> new`.
    pub fn emit_state(&self, new: ConnectionState, old: ConnectionState) {
        for listener in self.state.snapshot() {
            listener(new, old);
        }
    }

    /// Notifies data listeners of an inbound payload.
    pub fn emit_data(&self, data: &str) {
        for listener in self.data.snapshot() {
            listener(data);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_in_registration_order() {
        let listeners = Listeners::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            listeners.data.add(Arc::new(move |_: &str| seen.lock().push(tag)));
        }

        listeners.emit_data("x");
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_remove() {
        let listeners = Listeners::default();
        let id = listeners
            .state
            .add(Arc::new(|_: ConnectionState, _: ConnectionState| {}));

        assert_eq!(listeners.state.snapshot().len(), 1);
        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        assert_eq!(listeners.state.snapshot().len(), 0);
    }

    #[test]
    fn test_listener_may_remove_itself() {
        let listeners = Arc::new(Listeners::default());
        let calls = Arc::new(Mutex::new(0));
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let id = {
            let inner = Arc::clone(&listeners);
            let calls = Arc::clone(&calls);
            let slot = Arc::clone(&slot);
            listeners.data.add(Arc::new(move |_: &str| {
                *calls.lock() += 1;
                if let Some(id) = *slot.lock() {
                    inner.remove(id);
                }
            }))
        };
        *slot.lock() = Some(id);

        listeners.emit_data("a");
        listeners.emit_data("b");
        assert_eq!(*calls.lock(), 1);
    }
}
