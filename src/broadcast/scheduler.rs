//! Deferred callbacks: TTL auto-dismiss and auto-acknowledge.
//!
//! Timers run on the ambient tokio runtime. Outside a runtime nothing is
//! scheduled. A manual acknowledge or dismiss aborts the pending timer.

use std::collections::HashMap;
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::debug;

/// Spawn `f` after `delay`. Returns `None` when no tokio runtime is running.
pub(crate) fn spawn_after<F>(delay: Duration, f: F) -> Option<AbortHandle>
where
    F: FnOnce() + Send + 'static,
{
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        debug!(delay_ms = delay.as_millis() as u64, "No tokio runtime, deferred callback not scheduled");
        return None;
    };
    let task = handle.spawn(async move {
        tokio::time::sleep(delay).await;
        f();
    });
    Some(task.abort_handle())
}

/// Pending timers keyed by broadcast id.
#[derive(Debug, Default)]
pub(crate) struct Timers {
    /// At most one: only the current broadcast can expire.
    dismiss: Option<(String, AbortHandle)>,
    acks: HashMap<String, AbortHandle>,
}

impl Timers {
    /// Replace the dismiss timer, aborting the previous one.
    pub(crate) fn set_dismiss(&mut self, id: String, handle: AbortHandle) {
        if let Some((_, old)) = self.dismiss.replace((id, handle)) {
            old.abort();
        }
    }

    pub(crate) fn cancel_dismiss(&mut self) {
        if let Some((_, handle)) = self.dismiss.take() {
            handle.abort();
        }
    }

    /// Forget the dismiss timer for `id` without aborting it (it is the one firing).
    pub(crate) fn take_dismiss(&mut self, id: &str) {
        if self.dismiss.as_ref().is_some_and(|(d, _)| d == id) {
            self.dismiss = None;
        }
    }

    pub(crate) fn set_ack(&mut self, id: String, handle: AbortHandle) {
        if let Some(old) = self.acks.insert(id, handle) {
            old.abort();
        }
    }

    pub(crate) fn cancel_ack(&mut self, id: &str) {
        if let Some(handle) = self.acks.remove(id) {
            handle.abort();
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_acks(&self) -> usize {
        self.acks.len()
    }
}
