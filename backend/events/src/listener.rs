/// Listener trait and bundled listener implementations.
///
/// A listener is registered against exactly one event kind. Its identity is
/// the `Arc` it was registered with: removing a listener compares pointers,
/// not names.
use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use exthost_core::RuntimeEvent;

// ---------------------------------------------------------------------------
// Listener trait
// ---------------------------------------------------------------------------

/// A callback invoked for every event of the kind it is registered for.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "listener"
    }

    /// Handle one event. An `Err` is logged by the dispatcher and does not
    /// affect delivery to other listeners.
    async fn handle(&self, event: &RuntimeEvent) -> Result<()>;
}

/// Shared handle to a registered listener.
pub type ListenerRef = Arc<dyn Listener>;

/// True when both handles point at the same listener object.
pub fn same_listener(a: &ListenerRef, b: &ListenerRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

// ---------------------------------------------------------------------------
// Closure listener
// ---------------------------------------------------------------------------

/// Adapts a synchronous closure into a [`Listener`].
pub struct FnListener<F> {
    name: String,
    f: F,
}

impl<F> FnListener<F>
where
    F: Fn(&RuntimeEvent) -> Result<()> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

#[async_trait]
impl<F> Listener for FnListener<F>
where
    F: Fn(&RuntimeEvent) -> Result<()> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &RuntimeEvent) -> Result<()> {
        (self.f)(event)
    }
}

/// Wrap a closure as a shareable listener handle.
pub fn listener_fn<F>(name: impl Into<String>, f: F) -> ListenerRef
where
    F: Fn(&RuntimeEvent) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(FnListener::new(name, f))
}

// ---------------------------------------------------------------------------
// Recorder: keeps every event it sees
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct EventRecorder {
    events: Mutex<Vec<RuntimeEvent>>,
}

impl EventRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of the events recorded so far, in delivery order.
    pub fn events(&self) -> Vec<RuntimeEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Listener for EventRecorder {
    fn name(&self) -> &str {
        "event_recorder"
    }

    async fn handle(&self, event: &RuntimeEvent) -> Result<()> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exthost_core::ModuleState;

    #[tokio::test]
    async fn test_fn_listener_invokes_closure() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener = listener_fn("collect", move |ev| {
            sink.lock().unwrap().push(ev.kind());
            Ok(())
        });
        assert_eq!(listener.name(), "collect");
        listener.handle(&RuntimeEvent::Install).await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_listener_identity() {
        let a = listener_fn("a", |_| Ok(()));
        let b = listener_fn("a", |_| Ok(()));
        let a2 = a.clone();
        assert!(same_listener(&a, &a2));
        assert!(!same_listener(&a, &b));
    }

    #[tokio::test]
    async fn test_recorder_keeps_order() {
        let recorder = EventRecorder::new();
        recorder.handle(&RuntimeEvent::ModuleLoad(ModuleState::new("a", None))).await.unwrap();
        recorder.handle(&RuntimeEvent::ModuleUnload(ModuleState::new("a", None))).await.unwrap();
        let kinds: Vec<_> = recorder.events().iter().map(|e| e.kind().to_string()).collect();
        assert_eq!(kinds, vec!["module_load", "module_unload"]);
        assert!(!recorder.is_empty());
    }
}
