//! Commit notifications.
//!
//! Listeners are registered per handle under a named event. The only event
//! is [`CHANGE_EVENT`], fired synchronously after every successful commit
//! made through the handle.

use crate::error::{CoreError, CoreResult};
use crate::realm::Realm;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

/// Name of the event fired after each commit.
pub const CHANGE_EVENT: &str = "change";

/// A commit listener. Receives the handle and the event name.
///
/// Listeners are compared by `Arc` identity: registering the same `Arc`
/// twice is a no-op.
pub type Listener = Arc<dyn Fn(&Realm, &str) -> CoreResult<()> + Send + Sync>;

fn check_event(event: &str) -> CoreResult<()> {
    if event == CHANGE_EVENT {
        Ok(())
    } else {
        Err(CoreError::UnknownEvent {
            name: event.to_string(),
        })
    }
}

/// Ordered listener registrations of one handle.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    listeners: Mutex<Vec<Listener>>,
}

impl ListenerRegistry {
    pub(crate) fn add(&self, event: &str, listener: Listener) -> CoreResult<()> {
        check_event(event)?;
        let mut listeners = self.listeners.lock();
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
        Ok(())
    }

    pub(crate) fn remove(&self, event: &str, listener: &Listener) -> CoreResult<()> {
        check_event(event)?;
        let mut listeners = self.listeners.lock();
        if let Some(position) = listeners.iter().position(|l| Arc::ptr_eq(l, listener)) {
            listeners.remove(position);
        }
        Ok(())
    }

    pub(crate) fn clear(&self) {
        self.listeners.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Calls every listener in registration order.
    ///
    /// All listeners run even if one fails; the first error is returned.
    /// The registry is not locked while listeners run, so they may
    /// register or remove listeners themselves.
    pub(crate) fn dispatch(&self, realm: &Realm) -> CoreResult<()> {
        let listeners = self.listeners.lock().clone();
        let mut first_error = None;
        for listener in listeners {
            if let Err(err) = listener(realm, CHANGE_EVENT) {
                warn!(error = %err, "change listener failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Listener {
        Arc::new(|_: &Realm, _: &str| -> CoreResult<()> { Ok(()) })
    }

    #[test]
    fn rejects_unknown_events() {
        let registry = ListenerRegistry::default();
        assert!(matches!(
            registry.add("commit", noop()),
            Err(CoreError::UnknownEvent { name }) if name == "commit"
        ));
        assert!(registry.remove("other", &noop()).is_err());
    }

    #[test]
    fn deduplicates_by_identity() {
        let registry = ListenerRegistry::default();
        let listener = noop();
        registry.add(CHANGE_EVENT, Arc::clone(&listener)).unwrap();
        registry.add(CHANGE_EVENT, Arc::clone(&listener)).unwrap();
        assert_eq!(registry.len(), 1);

        registry.add(CHANGE_EVENT, noop()).unwrap();
        assert_eq!(registry.len(), 2);

        registry.remove(CHANGE_EVENT, &listener).unwrap();
        assert_eq!(registry.len(), 1);
        registry.clear();
        assert_eq!(registry.len(), 0);
    }
}
