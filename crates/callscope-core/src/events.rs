//! Call lifecycle events and the channel that fans them out to listeners.
//!
//! # Delivery
//!
//! Publishing never runs a listener inline. [`EventChannel::publish`] pushes
//! the event onto an unbounded queue and returns; a dispatcher task spawned on
//! the tokio runtime drains the queue in FIFO order and calls the listeners
//! registered for the event's kind, in subscription order.
//!
//! Because a single queue carries every event, the `Call` event of an
//! invocation is always delivered before that invocation's completion event.
//!
//! A listener that panics is caught, logged, and skipped. It cannot stop the
//! remaining listeners from seeing the event and it never reaches the
//! instrumented call.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use crate::error::{InstrumentError, Result};

/// Kind of call lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A wrapped callable was invoked.
    Call,
    /// The invocation completed successfully.
    CallResolved,
    /// The invocation failed.
    CallRejected,
}

impl EventKind {
    /// Every event kind, in lifecycle order.
    pub const ALL: [Self; 3] = [Self::Call, Self::CallResolved, Self::CallRejected];

    /// Returns the wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::CallResolved => "call_resolved",
            Self::CallRejected => "call_rejected",
        }
    }

    /// Returns true for `CallResolved` and `CallRejected`.
    #[must_use]
    pub const fn is_completion(self) -> bool {
        matches!(self, Self::CallResolved | Self::CallRejected)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single call lifecycle event.
///
/// `Call` events carry no elapsed time; completion events always do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEvent {
    kind: EventKind,
    name: Arc<str>,
    elapsed_ms: Option<f64>,
}

impl CallEvent {
    /// Creates a `Call` event.
    #[must_use]
    pub fn call(name: Arc<str>) -> Self {
        Self {
            kind: EventKind::Call,
            name,
            elapsed_ms: None,
        }
    }

    /// Creates a `CallResolved` event.
    #[must_use]
    pub fn resolved(name: Arc<str>, elapsed_ms: f64) -> Self {
        Self {
            kind: EventKind::CallResolved,
            name,
            elapsed_ms: Some(elapsed_ms),
        }
    }

    /// Creates a `CallRejected` event.
    #[must_use]
    pub fn rejected(name: Arc<str>, elapsed_ms: f64) -> Self {
        Self {
            kind: EventKind::CallRejected,
            name,
            elapsed_ms: Some(elapsed_ms),
        }
    }

    /// Returns the event kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Returns the tracked name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the elapsed milliseconds of a completion event.
    #[must_use]
    pub const fn elapsed_ms(&self) -> Option<f64> {
        self.elapsed_ms
    }

    /// Returns the elapsed time of a completion event.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed_ms
            .map(|ms| Duration::from_secs_f64(ms.max(0.0) / 1e3))
    }
}

/// Identifier returned by [`EventChannel::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// A registered event callback.
pub type Listener = Arc<dyn Fn(&CallEvent) + Send + Sync>;

/// Dispatcher behavior switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Log every dispatched event at `trace` level.
    pub trace_events: bool,
    /// Unregister a listener after it panics.
    pub remove_panicking_listeners: bool,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<EventKind, Vec<(ListenerId, Listener)>>,
}

impl Registry {
    fn add(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.entry(kind).or_default().push((id, listener));
        id
    }

    fn remove(&mut self, kind: EventKind, id: ListenerId) -> bool {
        let Some(entries) = self.listeners.get_mut(&kind) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    fn snapshot(&self, kind: EventKind) -> Vec<(ListenerId, Listener)> {
        self.listeners.get(&kind).cloned().unwrap_or_default()
    }

    fn count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }
}

enum DispatchCommand {
    Publish(CallEvent),
    Flush(oneshot::Sender<()>),
}

/// Publish/subscribe hub for call lifecycle events.
///
/// Cheap to clone; clones share listeners and the dispatcher.
#[derive(Clone)]
pub struct EventChannel {
    sender: mpsc::UnboundedSender<DispatchCommand>,
    registry: Arc<RwLock<Registry>>,
}

impl EventChannel {
    /// Creates a channel whose dispatcher runs on the current tokio runtime.
    ///
    /// # Errors
    /// Returns [`InstrumentError::NoRuntime`] outside a tokio runtime.
    pub fn new() -> Result<Self> {
        Self::with_options(DispatchOptions::default())
    }

    /// Creates a channel with explicit dispatcher options.
    ///
    /// # Errors
    /// Returns [`InstrumentError::NoRuntime`] outside a tokio runtime.
    pub fn with_options(options: DispatchOptions) -> Result<Self> {
        let handle = Handle::try_current().map_err(|_| InstrumentError::NoRuntime)?;
        Ok(Self::spawn_on(&handle, options))
    }

    /// Creates a channel whose dispatcher runs on the given runtime.
    #[must_use]
    pub fn spawn_on(handle: &Handle, options: DispatchOptions) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let registry = Arc::new(RwLock::new(Registry::default()));

        let dispatcher = Dispatcher {
            receiver,
            registry: Arc::clone(&registry),
            options,
        };
        handle.spawn(dispatcher.run());

        Self { sender, registry }
    }

    /// Registers a listener for one event kind.
    pub fn on(
        &self,
        kind: EventKind,
        listener: impl Fn(&CallEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.registry.write().add(kind, Arc::new(listener))
    }

    /// Unregisters a listener. Returns false if it was not registered.
    pub fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        self.registry.write().remove(kind, id)
    }

    /// Returns the number of listeners registered for a kind.
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registry.read().count(kind)
    }

    /// Queues an event for delivery and returns immediately.
    pub fn publish(&self, event: CallEvent) {
        if self.sender.send(DispatchCommand::Publish(event)).is_err() {
            tracing::debug!("event dispatcher closed, dropping call event");
        }
    }

    /// Waits until every event published before this call has been delivered.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(DispatchCommand::Flush(tx)).is_err() {
            return;
        }
        let _ = rx.await;
    }

    /// Returns true if the dispatcher is no longer running.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.read();
        f.debug_struct("EventChannel")
            .field("call_listeners", &registry.count(EventKind::Call))
            .field("resolved_listeners", &registry.count(EventKind::CallResolved))
            .field("rejected_listeners", &registry.count(EventKind::CallRejected))
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

struct Dispatcher {
    receiver: mpsc::UnboundedReceiver<DispatchCommand>,
    registry: Arc<RwLock<Registry>>,
    options: DispatchOptions,
}

impl Dispatcher {
    async fn run(mut self) {
        while let Some(command) = self.receiver.recv().await {
            match command {
                DispatchCommand::Publish(event) => self.dispatch(&event),
                DispatchCommand::Flush(response) => {
                    let _ = response.send(());
                }
            }
        }
        tracing::debug!("event dispatcher stopped");
    }

    fn dispatch(&self, event: &CallEvent) {
        if self.options.trace_events {
            tracing::trace!(
                kind = %event.kind(),
                name = %event.name(),
                elapsed_ms = ?event.elapsed_ms(),
                "dispatching call event"
            );
        }

        // Snapshot so listeners may (un)register without deadlocking.
        let listeners = self.registry.read().snapshot(event.kind());
        let mut panicked = Vec::new();

        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::error!(
                    listener_id = %id,
                    kind = %event.kind(),
                    name = %event.name(),
                    "call event listener panicked"
                );
                panicked.push(id);
            }
        }

        if self.options.remove_panicking_listeners && !panicked.is_empty() {
            let mut registry = self.registry.write();
            for id in panicked {
                registry.remove(event.kind(), id);
            }
        }
    }
}
