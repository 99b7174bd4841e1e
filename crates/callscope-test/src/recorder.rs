//! Event recorder.
//!
//! Subscribes to every event kind on a channel and keeps the events in
//! delivery order. Listeners are removed when the recorder is dropped.

use std::sync::Arc;
use std::time::Duration;

use callscope_core::{CallEvent, EventChannel, EventKind, ListenerId};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{Result, TestError};

/// Records every event delivered on a channel.
pub struct EventRecorder {
    channel: EventChannel,
    listeners: Vec<(EventKind, ListenerId)>,
    events: Arc<Mutex<Vec<CallEvent>>>,
    notify: Arc<Notify>,
}

impl EventRecorder {
    /// Subscribes to all event kinds on `channel`.
    #[must_use]
    pub fn attach(channel: &EventChannel) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let notify = Arc::new(Notify::new());

        let listeners = EventKind::ALL
            .into_iter()
            .map(|kind| {
                let events = Arc::clone(&events);
                let notify = Arc::clone(&notify);
                let id = channel.on(kind, move |event| {
                    events.lock().push(event.clone());
                    notify.notify_waiters();
                });
                (kind, id)
            })
            .collect();
        tracing::debug!(channel = ?channel, "event recorder attached");

        Self {
            channel: channel.clone(),
            listeners,
            events,
            notify,
        }
    }

    /// Returns a snapshot of the events delivered so far.
    #[must_use]
    pub fn events(&self) -> Vec<CallEvent> {
        self.events.lock().clone()
    }

    /// Returns how many events were delivered so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing was delivered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the delivered events of one kind.
    #[must_use]
    pub fn of_kind(&self, kind: EventKind) -> Vec<CallEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.kind() == kind)
            .cloned()
            .collect()
    }

    /// Returns the names of the delivered events, in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|event| event.name().to_string())
            .collect()
    }

    /// Returns the kinds of the delivered events, in order.
    #[must_use]
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(CallEvent::kind).collect()
    }

    /// Discards recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Flushes the channel and drains the recorded events.
    pub async fn flush_and_take(&self) -> Vec<CallEvent> {
        self.channel.flush().await;
        std::mem::take(&mut *self.events.lock())
    }

    /// Waits until at least `count` events were delivered.
    ///
    /// # Errors
    /// Returns [`TestError::Timeout`] if fewer arrive within `timeout`.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Result<Vec<CallEvent>> {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.len() >= count {
                    return self.events();
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| TestError::Timeout(timeout))
    }

    /// Checks the delivered events against `(kind, name)` pairs.
    ///
    /// # Errors
    /// Returns [`TestError::Assertion`] describing the first mismatch.
    pub fn expect_sequence(&self, expected: &[(EventKind, &str)]) -> Result<()> {
        let events = self.events.lock();
        if events.len() != expected.len() {
            return Err(TestError::assertion(format!(
                "expected {} events, got {}",
                expected.len(),
                events.len()
            )));
        }

        for (index, (event, (kind, name))) in events.iter().zip(expected).enumerate() {
            if event.kind() != *kind || event.name() != *name {
                return Err(TestError::assertion(format!(
                    "event {index}: expected {kind} {name}, got {} {}",
                    event.kind(),
                    event.name()
                )));
            }
        }
        Ok(())
    }
}

impl Drop for EventRecorder {
    fn drop(&mut self) {
        for (kind, id) in self.listeners.drain(..) {
            self.channel.remove_listener(kind, id);
        }
    }
}

impl std::fmt::Debug for EventRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRecorder")
            .field("recorded", &self.len())
            .finish_non_exhaustive()
    }
}
