/// Per-kind listener registry with a single ordered dispatch loop.
///
/// Listeners run sequentially in registration order. Events are delivered
/// strictly in the order they were queued, one at a time, from one Tokio
/// task owned by the dispatcher. A listener that fails, panics or overruns
/// its time limit is logged and skipped; the remaining listeners still run.
use anyhow::{Context, Result};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, warn};

use exthost_core::{EventKind, RuntimeEvent};

use crate::listener::{ListenerRef, same_listener};

type KindMap = HashMap<EventKind, Vec<ListenerRef>>;

/// How long one listener may run before it is abandoned.
pub const DEFAULT_LISTENER_TIMEOUT: Duration = Duration::from_secs(10);

tokio::task_local! {
    /// Set while a dispatch loop is running listener code.
    static IN_DISPATCH: ();
}

/// True when called from inside a listener.
pub fn in_dispatch() -> bool {
    IN_DISPATCH.try_with(|_| ()).is_ok()
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of delivering one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub kind: EventKind,
    /// Listeners that returned `Ok`.
    pub delivered: usize,
    /// Listeners that returned `Err`, panicked or timed out.
    pub failed: usize,
    /// The event was queued from inside a listener and delivered later.
    pub deferred: bool,
}

impl DispatchReport {
    fn deferred(kind: EventKind) -> Self {
        Self { kind, delivered: 0, failed: 0, deferred: true }
    }
}

/// Pending delivery of a queued event.
pub struct Delivery {
    kind: EventKind,
    ack: Option<oneshot::Receiver<DispatchReport>>,
}

impl Delivery {
    /// Wait until every listener has seen the event.
    ///
    /// Returns immediately with a `deferred` report when the event was queued
    /// from inside a listener, since the loop cannot deliver it until that
    /// listener returns.
    pub async fn wait(self) -> DispatchReport {
        match self.ack {
            Some(rx) => rx.await.unwrap_or_else(|_| DispatchReport::deferred(self.kind)),
            None => DispatchReport::deferred(self.kind),
        }
    }
}

struct Envelope {
    event: RuntimeEvent,
    ack: Option<oneshot::Sender<DispatchReport>>,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Thread-safe listener registry plus its dispatch loop.
///
/// Cloning is cheap and every clone feeds the same loop, which stops once
/// every clone is dropped. A listener that holds a clone (directly or through
/// a runtime handle) therefore keeps the loop alive until it is removed.
#[derive(Clone)]
pub struct EventDispatcher {
    channel: Arc<str>,
    listeners: Arc<RwLock<KindMap>>,
    queue: mpsc::UnboundedSender<Envelope>,
}

impl EventDispatcher {
    /// Start a dispatcher on the current Tokio runtime with the default
    /// listener time limit.
    pub fn new(channel: impl Into<Arc<str>>) -> Result<Self> {
        Self::with_listener_timeout(channel, DEFAULT_LISTENER_TIMEOUT)
    }

    /// Fails when called outside a Tokio runtime.
    pub fn with_listener_timeout(channel: impl Into<Arc<str>>, listener_timeout: Duration) -> Result<Self> {
        let channel = channel.into();
        let handle = Handle::try_current()
            .with_context(|| format!("event dispatcher '{channel}' needs a Tokio runtime"))?;
        let listeners: Arc<RwLock<KindMap>> = Arc::default();
        let (queue, rx) = mpsc::unbounded_channel();
        handle.spawn(dispatch_loop(channel.clone(), listeners.clone(), listener_timeout, rx));
        debug!(channel = %channel, timeout_ms = listener_timeout.as_millis() as u64, "Event dispatcher started");
        Ok(Self { channel, listeners, queue })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Register a listener. Registering the same listener twice makes it
    /// run twice per event.
    pub async fn add_listener(&self, kind: EventKind, listener: ListenerRef) {
        let mut map = self.listeners.write().await;
        debug!(channel = %self.channel, kind = %kind, listener = listener.name(), "Listener added");
        map.entry(kind).or_default().push(listener);
    }

    /// Remove the most recent registration of `listener` for `kind`.
    /// Returns false if it was not registered.
    pub async fn remove_listener(&self, kind: EventKind, listener: &ListenerRef) -> bool {
        let mut map = self.listeners.write().await;
        let Some(chain) = map.get_mut(&kind) else {
            return false;
        };
        let Some(pos) = chain.iter().rposition(|l| same_listener(l, listener)) else {
            return false;
        };
        chain.remove(pos);
        if chain.is_empty() {
            map.remove(&kind);
        }
        debug!(channel = %self.channel, kind = %kind, listener = listener.name(), "Listener removed");
        true
    }

    pub async fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.read().await.get(&kind).map_or(0, Vec::len)
    }

    /// Queue an event without waiting for delivery.
    ///
    /// Does not await, so callers can queue while holding their own state
    /// lock and keep queue order equal to commit order.
    pub fn enqueue(&self, event: RuntimeEvent) -> Delivery {
        let kind = event.kind();
        let (ack_tx, ack_rx) = if in_dispatch() {
            (None, None)
        } else {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        };

        if self.queue.send(Envelope { event, ack: ack_tx }).is_err() {
            warn!(channel = %self.channel, kind = %kind, "Dispatch loop stopped; event dropped");
            return Delivery { kind, ack: None };
        }
        Delivery { kind, ack: ack_rx }
    }

    /// Queue an event and wait for every listener to run.
    pub async fn emit(&self, event: RuntimeEvent) -> DispatchReport {
        self.enqueue(event).wait().await
    }
}

async fn dispatch_loop(
    channel: Arc<str>,
    listeners: Arc<RwLock<KindMap>>,
    listener_timeout: Duration,
    mut rx: mpsc::UnboundedReceiver<Envelope>,
) {
    while let Some(envelope) = rx.recv().await {
        let report = IN_DISPATCH
            .scope((), deliver(&channel, &listeners, listener_timeout, &envelope.event))
            .await;
        if let Some(ack) = envelope.ack {
            let _ = ack.send(report);
        }
    }
    debug!(channel = %channel, "Event dispatcher stopped");
}

async fn deliver(
    channel: &str,
    listeners: &RwLock<KindMap>,
    listener_timeout: Duration,
    event: &RuntimeEvent,
) -> DispatchReport {
    let kind = event.kind();
    // Snapshot so listeners may add/remove listeners without deadlocking.
    let chain: Vec<ListenerRef> = listeners.read().await.get(&kind).cloned().unwrap_or_default();

    let mut report = DispatchReport { kind, delivered: 0, failed: 0, deferred: false };
    for listener in chain {
        debug!(channel, kind = %kind, listener = listener.name(), "Dispatching");
        let call = AssertUnwindSafe(listener.handle(event)).catch_unwind();
        match tokio::time::timeout(listener_timeout, call).await {
            Ok(Ok(Ok(()))) => report.delivered += 1,
            Ok(Ok(Err(e))) => {
                warn!(channel, kind = %kind, listener = listener.name(), error = %e, "Listener failed");
                report.failed += 1;
            }
            Ok(Err(panic)) => {
                warn!(
                    channel,
                    kind = %kind,
                    listener = listener.name(),
                    panic = %panic_message(&*panic),
                    "Listener panicked"
                );
                report.failed += 1;
            }
            Err(_) => {
                warn!(
                    channel,
                    kind = %kind,
                    listener = listener.name(),
                    timeout_ms = listener_timeout.as_millis() as u64,
                    "Listener timed out; abandoned"
                );
                report.failed += 1;
            }
        }
    }
    report
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
