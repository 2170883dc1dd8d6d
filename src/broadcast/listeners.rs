//! Subscriber registry and synchronous fan-out.
//!
//! Listeners are called in subscription order. Each call is isolated: an
//! `Err` or a panic from one listener is logged and the next one still runs.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, warn};

use crate::types::BroadcastMessage;

/// Callback invoked once per dispatched message.
pub type Listener = Arc<dyn Fn(&BroadcastMessage) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

impl ListenerRegistry {
    pub(crate) fn add(&mut self, listener: Listener) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(lid, _)| *lid != id);
        self.entries.len() != before
    }

    /// Clone of the current listener list, so fan-out runs without the lock.
    pub(crate) fn snapshot(&self) -> Vec<Listener> {
        self.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Handle returned by `BroadcastService::subscribe`.
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<ListenerRegistry>>,
}

impl Subscription {
    pub(crate) fn new(id: u64, registry: Weak<Mutex<ListenerRegistry>>) -> Self {
        Self { id, registry }
    }

    /// Remove the listener. Returns `false` if it was already gone or the
    /// service has been dropped.
    pub fn unsubscribe(self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut guard = registry.lock().unwrap_or_else(|e| {
            warn!("Mutex poisoned on listener registry, recovering");
            e.into_inner()
        });
        guard.remove(self.id)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Deliver `message` to every listener. Returns the number that failed.
pub(crate) fn notify_all(listeners: &[Listener], message: &BroadcastMessage) -> usize {
    let mut failures = 0;
    for (index, listener) in listeners.iter().enumerate() {
        match catch_unwind(AssertUnwindSafe(|| listener(message))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failures += 1;
                warn!(listener = index, broadcast_id = %message.id, error = %e, "Broadcast listener failed");
            }
            Err(payload) => {
                failures += 1;
                warn!(
                    listener = index,
                    broadcast_id = %message.id,
                    panic = %panic_message(payload.as_ref()),
                    "Broadcast listener panicked"
                );
            }
        }
    }
    debug!(broadcast_id = %message.id, listeners = listeners.len(), failures, "Broadcast delivered");
    failures
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::test_support::message;
    use crate::types::BroadcastPriority;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn listener<F>(f: F) -> Listener
    where
        F: Fn(&BroadcastMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    #[test]
    fn test_failing_listeners_do_not_block_later_ones() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        let listeners: Vec<Listener> = vec![
            listener(|_| Err(anyhow::anyhow!("boom"))),
            listener(|_| panic!("listener exploded")),
            listener(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        ];

        let failures = notify_all(&listeners, &message("m", BroadcastPriority::High));
        assert_eq!(failures, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_removes_listener() {
        let registry = Arc::new(Mutex::new(ListenerRegistry::default()));
        let id = registry.lock().unwrap().add(listener(|_| Ok(())));
        let sub = Subscription::new(id, Arc::downgrade(&registry));

        assert_eq!(registry.lock().unwrap().len(), 1);
        assert!(sub.unsubscribe());
        assert_eq!(registry.lock().unwrap().len(), 0);
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let registry = Arc::new(Mutex::new(ListenerRegistry::default()));
        let id = registry.lock().unwrap().add(listener(|_| Ok(())));
        let sub = Subscription::new(id, Arc::downgrade(&registry));
        drop(registry);
        assert!(!sub.unsubscribe());
    }
}
