//! Runtime facade.
//!
//! `ExtensionRuntime` owns the module registry, the permission ledger and the
//! extension lifecycle behind one lock, and routes every committed state
//! change to the event dispatchers. Events are queued while the lock is still
//! held, so listeners observe them in commit order; the mutating call returns
//! only after its listeners have run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use exthost_core::{
    EventKind, ExtensionMessage, ExtensionUpdate, MessageTransport, ModuleState, PlatformInfo,
    ReloadHandler, RuntimeError, RuntimeEvent, RuntimeResult, UpdateCheck, UpdateSource,
};
use exthost_events::{DEFAULT_LISTENER_TIMEOUT, Delivery, EventDispatcher, ListenerRef};

use crate::lifecycle::{ExtensionLifecycle, ExtensionPhase};
use crate::manifest::ExtensionManifest;
use crate::permissions::{PermissionLedger, validate_grant};
use crate::registry::{ModuleRecord, ModuleRegistry};
use crate::update::{StaticUpdateSource, UpdateChecker};

/// Version assumed when neither the builder nor the manifest provides one.
const FALLBACK_VERSION: &str = "0.0.0";

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Default)]
struct HostState {
    registry: ModuleRegistry,
    ledger: PermissionLedger,
    lifecycle: ExtensionLifecycle,
}

struct Inner {
    extension_id: String,
    manifest: ExtensionManifest,
    platform: PlatformInfo,
    state: Mutex<HostState>,
    updates: UpdateChecker,
    lifecycle_events: EventDispatcher,
    message_events: EventDispatcher,
    reload: Option<Arc<dyn ReloadHandler>>,
    transport: Option<Arc<dyn MessageTransport>>,
}

/// The extension runtime host. Cheap to clone; all clones share state.
///
/// The dispatch loops live as long as any clone does. A listener that keeps
/// a clone of the runtime it is registered on forms a reference cycle, so
/// its loops only stop once that listener is removed.
#[derive(Clone)]
pub struct ExtensionRuntime {
    inner: Arc<Inner>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct RuntimeBuilder {
    extension_id: String,
    manifest: ExtensionManifest,
    version: Option<String>,
    platform: Option<PlatformInfo>,
    enabled: bool,
    update_source: Option<Arc<dyn UpdateSource>>,
    reload: Option<Arc<dyn ReloadHandler>>,
    transport: Option<Arc<dyn MessageTransport>>,
    listener_timeout: Duration,
}

impl RuntimeBuilder {
    pub fn new(extension_id: impl Into<String>) -> Self {
        Self {
            extension_id: extension_id.into(),
            manifest: ExtensionManifest::default(),
            version: None,
            platform: None,
            enabled: true,
            update_source: None,
            reload: None,
            transport: None,
            listener_timeout: DEFAULT_LISTENER_TIMEOUT,
        }
    }

    pub fn manifest(mut self, manifest: ExtensionManifest) -> Self {
        self.manifest = manifest;
        self
    }

    /// Running version. Defaults to the manifest's `version`.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Override platform detection (tests, cross-hosting).
    pub fn platform(mut self, platform: PlatformInfo) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn update_source(mut self, source: Arc<dyn UpdateSource>) -> Self {
        self.update_source = Some(source);
        self
    }

    pub fn reload_handler(mut self, handler: Arc<dyn ReloadHandler>) -> Self {
        self.reload = Some(handler);
        self
    }

    pub fn message_transport(mut self, transport: Arc<dyn MessageTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Longest time one listener may run before it is abandoned and counted
    /// as failed.
    pub fn listener_timeout(mut self, timeout: Duration) -> Self {
        self.listener_timeout = timeout;
        self
    }

    /// Build the runtime. Fails outside a Tokio runtime.
    pub fn build(self) -> RuntimeResult<ExtensionRuntime> {
        if self.extension_id.is_empty() {
            return Err(RuntimeError::Manifest("extension id must not be empty".into()));
        }
        let platform = match self.platform {
            Some(p) => p,
            None => PlatformInfo::current()?,
        };
        let version = self
            .version
            .or_else(|| self.manifest.version().map(String::from))
            .unwrap_or_else(|| FALLBACK_VERSION.to_string());
        let source: Arc<dyn UpdateSource> = match self.update_source {
            Some(source) => source,
            None => Arc::new(StaticUpdateSource::new(ExtensionUpdate::new(version.clone()))),
        };

        let lifecycle_events = EventDispatcher::with_listener_timeout("lifecycle", self.listener_timeout)?;
        let message_events = EventDispatcher::with_listener_timeout("message", self.listener_timeout)?;

        info!(
            extension = %self.extension_id,
            version = %version,
            os = %platform.os,
            arch = %platform.arch,
            "Extension runtime starting"
        );

        let state = HostState {
            lifecycle: ExtensionLifecycle::new(self.enabled),
            ..HostState::default()
        };

        Ok(ExtensionRuntime {
            inner: Arc::new(Inner {
                extension_id: self.extension_id,
                manifest: self.manifest,
                platform,
                state: Mutex::new(state),
                updates: UpdateChecker::new(version, source),
                lifecycle_events,
                message_events,
                reload: self.reload,
                transport: self.transport,
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// Event handlers
// ---------------------------------------------------------------------------

/// Subscribe/unsubscribe surface for one event kind.
pub struct EventHandler<'a> {
    kind: EventKind,
    dispatcher: &'a EventDispatcher,
}

impl EventHandler<'_> {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub async fn add_listener(&self, listener: ListenerRef) {
        self.dispatcher.add_listener(self.kind, listener).await;
    }

    pub async fn remove_listener(&self, listener: &ListenerRef) -> bool {
        self.dispatcher.remove_listener(self.kind, listener).await
    }

    pub async fn listener_count(&self) -> usize {
        self.dispatcher.listener_count(self.kind).await
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

impl ExtensionRuntime {
    pub fn builder(extension_id: impl Into<String>) -> RuntimeBuilder {
        RuntimeBuilder::new(extension_id)
    }

    pub fn extension_id(&self) -> &str {
        &self.inner.extension_id
    }

    pub fn current_version(&self) -> &str {
        self.inner.updates.current_version()
    }

    fn dispatcher_for(&self, kind: EventKind) -> &EventDispatcher {
        match kind {
            EventKind::Message => &self.inner.message_events,
            _ => &self.inner.lifecycle_events,
        }
    }

    /// Apply a mutation under the state lock, queue its events before the
    /// lock is released, then wait for delivery.
    async fn apply<T>(&self, op: impl FnOnce(&mut HostState) -> (T, Vec<RuntimeEvent>)) -> T {
        let (value, deliveries) = {
            let mut state = self.inner.state.lock().await;
            let (value, events) = op(&mut state);
            let deliveries: Vec<Delivery> = events
                .into_iter()
                .map(|event| self.dispatcher_for(event.kind()).enqueue(event))
                .collect();
            (value, deliveries)
        };
        for delivery in deliveries {
            let report = delivery.wait().await;
            if report.failed > 0 {
                debug!(kind = %report.kind, failed = report.failed, "Some listeners failed");
            }
        }
        value
    }

    /// [`Self::apply`] for mutations that may be refused. A refused mutation
    /// changes nothing and emits nothing.
    async fn commit<T>(
        &self,
        op: impl FnOnce(&mut HostState) -> RuntimeResult<(T, Vec<RuntimeEvent>)>,
    ) -> RuntimeResult<T> {
        self.apply(|s| match op(s) {
            Ok((value, events)) => (Ok(value), events),
            Err(e) => (Err(e), Vec::new()),
        })
        .await
    }

    // -- Queries -------------------------------------------------------------

    pub async fn get_manifest(&self) -> Value {
        self.inner.manifest.as_value().clone()
    }

    pub async fn get_platform_info(&self) -> PlatformInfo {
        self.inner.platform
    }

    /// Ids of all loaded modules.
    pub async fn get_modules(&self) -> Vec<String> {
        self.inner.state.lock().await.registry.list()
    }

    /// Granted permissions per module; modules without grants are omitted.
    pub async fn get_permissions(&self) -> BTreeMap<String, Vec<String>> {
        self.inner.state.lock().await.ledger.get_all()
    }

    pub async fn module(&self, id: &str) -> Option<ModuleRecord> {
        self.inner.state.lock().await.registry.get(id).cloned()
    }

    pub async fn check_permission(&self, module: &str, permission: &str) -> RuntimeResult<()> {
        self.inner.state.lock().await.ledger.check(module, permission)
    }

    pub async fn phase(&self) -> ExtensionPhase {
        self.inner.state.lock().await.lifecycle.phase()
    }

    // -- Actions -------------------------------------------------------------

    /// Check for an update. Emits `update_available` when one is found.
    pub async fn request_update_check(&self) -> UpdateCheck {
        let result = self.inner.updates.check().await;
        if let UpdateCheck::UpdateAvailable(details) = &result {
            self.inner
                .lifecycle_events
                .emit(RuntimeEvent::UpdateAvailable(details.clone()))
                .await;
        }
        result
    }

    /// Hand a reload request to the host. Resolves once the request is
    /// accepted, not when the reload has finished.
    pub async fn reload(&self) -> RuntimeResult<()> {
        let Some(handler) = &self.inner.reload else {
            return Err(RuntimeError::ReloadRejected("no reload handler configured".into()));
        };
        handler
            .request_reload()
            .await
            .map_err(|e| RuntimeError::ReloadRejected(e.to_string()))?;
        info!(extension = %self.inner.extension_id, "Reload requested");
        Ok(())
    }

    /// Send a cross-extension message labelled with this extension's id.
    pub async fn send_message(&self, payload: Value) -> RuntimeResult<()> {
        let Some(transport) = &self.inner.transport else {
            return Err(RuntimeError::MessageRejected("no message transport configured".into()));
        };
        let message = ExtensionMessage::new(self.inner.extension_id.clone(), payload);
        transport
            .send(message)
            .await
            .map_err(|e| RuntimeError::MessageRejected(e.to_string()))
    }

    /// Inbound message from the transport; fans out to message listeners.
    pub async fn deliver_message(&self, sender: &str, payload: Value) -> ExtensionMessage {
        let message = ExtensionMessage::new(sender, payload);
        debug!(sender = %sender, message_id = %message.id, "Delivering message");
        self.inner
            .message_events
            .emit(RuntimeEvent::Message(message.clone()))
            .await;
        message
    }

    // -- Module registry -----------------------------------------------------

    pub async fn load_module(&self, id: &str, path: Option<&str>) -> RuntimeResult<ModuleState> {
        self.commit(|s| {
            let state = s.registry.load(id, path.map(String::from))?;
            Ok((state.clone(), vec![RuntimeEvent::ModuleLoad(state)]))
        })
        .await
    }

    /// Unload a module and revoke all of its grants in the same step.
    pub async fn unload_module(&self, id: &str) -> RuntimeResult<ModuleState> {
        self.commit(|s| {
            let state = s.registry.unload(id)?;
            let revoked = s.ledger.revoke_all(id);
            if !revoked.is_empty() {
                info!(module = %id, count = revoked.len(), "Revoked grants of unloaded module");
            }
            let mut events = vec![RuntimeEvent::ModuleUnload(state.clone())];
            events.extend(revoked.into_iter().map(|permission| RuntimeEvent::PermissionRevoke {
                module: id.to_string(),
                permission,
            }));
            Ok((state, events))
        })
        .await
    }

    // -- Permission ledger ---------------------------------------------------

    /// Grant a permission to a loaded module. Returns false (and emits
    /// nothing) if it was already granted.
    pub async fn grant_permission(&self, module: &str, permission: &str) -> RuntimeResult<bool> {
        self.commit(|s| {
            validate_grant(module, permission)?;
            if !s.registry.is_loaded(module) {
                warn!(module = %module, permission = %permission, "Grant to module that is not loaded");
                return Err(RuntimeError::NotLoaded(module.to_string()));
            }
            let added = s.ledger.grant(module, permission)?;
            let events = if added {
                vec![RuntimeEvent::PermissionGrant {
                    module: module.to_string(),
                    permission: permission.to_string(),
                }]
            } else {
                Vec::new()
            };
            Ok((added, events))
        })
        .await
    }

    /// Revoke a permission. Returns false (and emits nothing) if it was not granted.
    pub async fn revoke_permission(&self, module: &str, permission: &str) -> RuntimeResult<bool> {
        self.commit(|s| {
            let removed = s.ledger.revoke(module, permission);
            let events = if removed {
                vec![RuntimeEvent::PermissionRevoke {
                    module: module.to_string(),
                    permission: permission.to_string(),
                }]
            } else {
                Vec::new()
            };
            Ok((removed, events))
        })
        .await
    }

    // -- Extension lifecycle -------------------------------------------------

    pub async fn notify_installed(&self) {
        self.apply(|s| ((), s.lifecycle.install().into_iter().collect())).await
    }

    pub async fn notify_uninstalling(&self) {
        self.apply(|s| ((), s.lifecycle.uninstall().into_iter().collect())).await
    }

    /// Returns true if the state changed.
    pub async fn set_enabled(&self, enabled: bool) -> bool {
        self.apply(|s| {
            let event = s.lifecycle.set_enabled(enabled);
            (event.is_some(), event.into_iter().collect())
        })
        .await
    }

    pub async fn notify_clicked(&self) {
        self.inner.lifecycle_events.emit(RuntimeEvent::ExtensionClick).await;
    }

    // -- Event surface -------------------------------------------------------

    pub fn on(&self, kind: EventKind) -> EventHandler<'_> {
        EventHandler { kind, dispatcher: self.dispatcher_for(kind) }
    }

    pub fn on_install(&self) -> EventHandler<'_> {
        self.on(EventKind::Install)
    }

    pub fn on_uninstall(&self) -> EventHandler<'_> {
        self.on(EventKind::Uninstall)
    }

    pub fn on_enable(&self) -> EventHandler<'_> {
        self.on(EventKind::Enable)
    }

    pub fn on_disable(&self) -> EventHandler<'_> {
        self.on(EventKind::Disable)
    }

    pub fn on_update_available(&self) -> EventHandler<'_> {
        self.on(EventKind::UpdateAvailable)
    }

    pub fn on_permission_grant(&self) -> EventHandler<'_> {
        self.on(EventKind::PermissionGrant)
    }

    pub fn on_permission_revoke(&self) -> EventHandler<'_> {
        self.on(EventKind::PermissionRevoke)
    }

    pub fn on_module_load(&self) -> EventHandler<'_> {
        self.on(EventKind::ModuleLoad)
    }

    pub fn on_module_unload(&self) -> EventHandler<'_> {
        self.on(EventKind::ModuleUnload)
    }

    pub fn on_extension_click(&self) -> EventHandler<'_> {
        self.on(EventKind::ExtensionClick)
    }

    pub fn on_message(&self) -> EventHandler<'_> {
        self.on(EventKind::Message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use exthost_core::{Arch, Os};
    use exthost_events::{EventRecorder, Listener, listener_fn};
    use serde_json::json;
    use tokio::sync::Notify;

    use crate::transport::{ChannelReloadHandler, ChannelTransport};

    const LINUX: PlatformInfo = PlatformInfo { os: Os::Linux, arch: Arch::X86_64 };

    fn runtime() -> ExtensionRuntime {
        ExtensionRuntime::builder("clipper")
            .platform(LINUX)
            .version("1.0")
            .build()
            .unwrap()
    }

    fn runtime_with_latest(latest: ExtensionUpdate) -> ExtensionRuntime {
        ExtensionRuntime::builder("clipper")
            .platform(LINUX)
            .version("1.0")
            .update_source(Arc::new(StaticUpdateSource::new(latest)))
            .build()
            .unwrap()
    }

    async fn record(rt: &ExtensionRuntime, kinds: &[EventKind]) -> Arc<EventRecorder> {
        let recorder = EventRecorder::new();
        for kind in kinds {
            rt.on(*kind).add_listener(recorder.clone()).await;
        }
        recorder
    }

    #[tokio::test]
    async fn test_load_then_unload_clears_module_and_grants() {
        let rt = runtime();
        rt.load_module("ui", Some("/ext/ui")).await.unwrap();
        rt.grant_permission("ui", "storage").await.unwrap();
        rt.grant_permission("ui", "tabs").await.unwrap();

        rt.unload_module("ui").await.unwrap();
        assert!(rt.get_modules().await.is_empty());
        assert!(!rt.get_permissions().await.contains_key("ui"));
    }

    #[tokio::test]
    async fn test_grant_and_revoke_visible_in_snapshot() {
        let rt = runtime();
        rt.load_module("ui", None).await.unwrap();
        rt.load_module("bg", None).await.unwrap();
        rt.grant_permission("ui", "storage").await.unwrap();
        rt.grant_permission("bg", "alarms").await.unwrap();
        assert_eq!(rt.get_permissions().await["ui"], vec!["storage"]);

        rt.revoke_permission("ui", "storage").await.unwrap();
        let perms = rt.get_permissions().await;
        assert!(!perms.contains_key("ui"));
        assert_eq!(perms["bg"], vec!["alarms"]);
    }

    #[tokio::test]
    async fn test_module_load_listener_runs_before_load_returns() {
        let rt = runtime();
        let recorder = record(&rt, &[EventKind::ModuleLoad]).await;

        rt.load_module("a", Some("/x")).await.unwrap();
        assert_eq!(
            recorder.events(),
            vec![RuntimeEvent::ModuleLoad(ModuleState::new("a", Some("/x".into())))]
        );
    }

    #[tokio::test]
    async fn test_double_load_fails_without_duplicate_event() {
        let rt = runtime();
        let recorder = record(&rt, &[EventKind::ModuleLoad]).await;

        rt.load_module("a", Some("/x")).await.unwrap();
        let err = rt.load_module("a", Some("/x")).await.unwrap_err();
        assert!(matches!(err, RuntimeError::AlreadyLoaded(_)));
        assert_eq!(recorder.len(), 1);
    }

    #[tokio::test]
    async fn test_unload_unknown_module_fails() {
        let rt = runtime();
        let recorder = record(&rt, &[EventKind::ModuleUnload]).await;
        let err = rt.unload_module("ghost").await.unwrap_err();
        assert!(matches!(err, RuntimeError::NotLoaded(_)));
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_update_check_no_update_when_current() {
        let rt = runtime_with_latest(ExtensionUpdate::new("1.0"));
        let recorder = record(&rt, &[EventKind::UpdateAvailable]).await;

        let result = rt.request_update_check().await;
        assert_eq!(result, UpdateCheck::NoUpdate);
        assert!(result.details().is_none());
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_update_check_available_emits_once() {
        let rt = runtime_with_latest(ExtensionUpdate::new("2.0"));
        let recorder = record(&rt, &[EventKind::UpdateAvailable]).await;

        let result = rt.request_update_check().await;
        let expected = ExtensionUpdate { version: "2.0".into(), version_name: None };
        assert_eq!(result, UpdateCheck::UpdateAvailable(expected.clone()));
        assert_eq!(recorder.events(), vec![RuntimeEvent::UpdateAvailable(expected)]);
    }

    #[tokio::test]
    async fn test_concurrent_update_checks_are_all_honoured() {
        let rt = runtime_with_latest(ExtensionUpdate::new("2.0").with_name("Two"));
        let recorder = record(&rt, &[EventKind::UpdateAvailable]).await;

        let (a, b) = tokio::join!(rt.request_update_check(), rt.request_update_check());
        assert!(a.is_available() && b.is_available());
        assert_eq!(recorder.len(), 2);
    }

    #[tokio::test]
    async fn test_default_update_source_reports_no_update() {
        let rt = runtime();
        assert_eq!(rt.request_update_check().await, UpdateCheck::NoUpdate);
    }

    #[tokio::test]
    async fn test_removed_listener_sees_nothing() {
        let rt = runtime();
        let recorder = EventRecorder::new();
        let listener: ListenerRef = recorder.clone();
        rt.on_module_load().add_listener(listener.clone()).await;
        assert!(rt.on_module_load().remove_listener(&listener).await);

        rt.load_module("a", None).await.unwrap();
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_grant_events_keep_call_order() {
        let rt = runtime();
        let recorder = record(&rt, &[EventKind::PermissionGrant]).await;
        rt.load_module("m", None).await.unwrap();

        rt.grant_permission("m", "p1").await.unwrap();
        rt.grant_permission("m", "p2").await.unwrap();

        let perms: Vec<String> = recorder
            .events()
            .into_iter()
            .filter_map(|e| match e {
                RuntimeEvent::PermissionGrant { permission, .. } => Some(permission),
                _ => None,
            })
            .collect();
        assert_eq!(perms, vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_regrant_is_silent() {
        let rt = runtime();
        let recorder = record(&rt, &[EventKind::PermissionGrant]).await;
        rt.load_module("m", None).await.unwrap();

        assert!(rt.grant_permission("m", "p").await.unwrap());
        assert!(!rt.grant_permission("m", "p").await.unwrap());
        assert_eq!(recorder.len(), 1);
    }

    #[tokio::test]
    async fn test_grant_validates_keys_before_load_state() {
        let rt = runtime();
        let recorder = record(&rt, &[EventKind::PermissionGrant]).await;
        let err = rt.grant_permission("", "tabs").await.unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidModuleId));
        let err = rt.grant_permission("ghost", "").await.unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidPermission(_)));
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_grant_to_unloaded_module_is_rejected() {
        let rt = runtime();
        let err = rt.grant_permission("ghost", "storage").await.unwrap_err();
        assert!(matches!(err, RuntimeError::NotLoaded(_)));
        assert!(rt.get_permissions().await.is_empty());
    }

    #[tokio::test]
    async fn test_unload_emits_unload_then_revokes() {
        let rt = runtime();
        let recorder = record(&rt, &[EventKind::ModuleUnload, EventKind::PermissionRevoke]).await;
        rt.load_module("ui", Some("/ext/ui")).await.unwrap();
        rt.grant_permission("ui", "tabs").await.unwrap();
        rt.grant_permission("ui", "storage").await.unwrap();

        rt.unload_module("ui").await.unwrap();
        let events = recorder.events();
        assert_eq!(events[0], RuntimeEvent::ModuleUnload(ModuleState::new("ui", Some("/ext/ui".into()))));
        assert_eq!(events.len(), 3);
        assert!(events[1..].iter().all(|e| e.kind() == EventKind::PermissionRevoke));
    }

    #[tokio::test]
    async fn test_revoke_missing_emits_nothing() {
        let rt = runtime();
        let recorder = record(&rt, &[EventKind::PermissionRevoke]).await;
        assert!(!rt.revoke_permission("ui", "tabs").await.unwrap());
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_listener_fault_does_not_roll_back() {
        let rt = runtime();
        rt.on_module_load()
            .add_listener(listener_fn("broken", |_| anyhow::bail!("listener failure")))
            .await;
        let recorder = record(&rt, &[EventKind::ModuleLoad]).await;

        rt.load_module("a", None).await.unwrap();
        assert_eq!(rt.get_modules().await, vec!["a"]);
        assert_eq!(recorder.len(), 1);
    }

    #[tokio::test]
    async fn test_listener_observes_committed_state() {
        let rt = runtime();
        let observed = Arc::new(std::sync::Mutex::new(Vec::new()));

        struct Observer {
            rt: ExtensionRuntime,
            observed: Arc<std::sync::Mutex<Vec<Vec<String>>>>,
        }

        #[async_trait]
        impl Listener for Observer {
            async fn handle(&self, _event: &RuntimeEvent) -> Result<()> {
                let modules = self.rt.get_modules().await;
                self.observed.lock().unwrap().push(modules);
                Ok(())
            }
        }

        rt.on_module_load()
            .add_listener(Arc::new(Observer { rt: rt.clone(), observed: observed.clone() }))
            .await;
        rt.load_module("a", None).await.unwrap();
        assert_eq!(*observed.lock().unwrap(), vec![vec!["a".to_string()]]);
    }

    #[tokio::test]
    async fn test_mutation_from_listener_is_delivered_after() {
        let rt = runtime();
        let recorder = record(&rt, &[EventKind::ModuleLoad, EventKind::PermissionGrant]).await;

        struct AutoGrant {
            rt: ExtensionRuntime,
        }

        #[async_trait]
        impl Listener for AutoGrant {
            async fn handle(&self, event: &RuntimeEvent) -> Result<()> {
                if let Some(module) = event.module_id() {
                    self.rt.grant_permission(module, "storage").await?;
                }
                Ok(())
            }
        }

        rt.on_module_load().add_listener(Arc::new(AutoGrant { rt: rt.clone() })).await;
        rt.load_module("a", None).await.unwrap();
        assert_eq!(rt.get_permissions().await["a"], vec!["storage"]);

        // Flush the queue behind the nested grant.
        rt.notify_clicked().await;
        let kinds: Vec<EventKind> = recorder.events().iter().map(RuntimeEvent::kind).collect();
        assert_eq!(kinds, vec![EventKind::ModuleLoad, EventKind::PermissionGrant]);
    }

    #[tokio::test]
    async fn test_lifecycle_events() {
        let rt = runtime();
        let recorder = record(
            &rt,
            &[EventKind::Install, EventKind::Enable, EventKind::Disable, EventKind::Uninstall, EventKind::ExtensionClick],
        )
        .await;

        rt.notify_installed().await;
        assert!(!rt.set_enabled(true).await);
        assert!(rt.set_enabled(false).await);
        rt.notify_clicked().await;
        rt.notify_uninstalling().await;
        assert_eq!(rt.phase().await, ExtensionPhase::Uninstalling);

        let kinds: Vec<EventKind> = recorder.events().iter().map(RuntimeEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Install, EventKind::Disable, EventKind::ExtensionClick, EventKind::Uninstall]
        );
    }

    #[tokio::test]
    async fn test_queries_are_snapshots() {
        let manifest = ExtensionManifest::from_value(json!({"name": "clipper", "version": "1.4"})).unwrap();
        let rt = ExtensionRuntime::builder("clipper")
            .platform(PlatformInfo { os: Os::Mac, arch: Arch::Arm64 })
            .manifest(manifest)
            .build()
            .unwrap();

        assert_eq!(rt.current_version(), "1.4");
        assert_eq!(rt.get_manifest().await["name"], "clipper");
        assert_eq!(rt.get_platform_info().await.os, Os::Mac);

        let before = rt.get_modules().await;
        rt.load_module("a", None).await.unwrap();
        assert!(before.is_empty());
        assert_eq!(rt.module("a").await.unwrap().load_count, 1);
    }

    #[tokio::test]
    async fn test_reload_hands_off_to_host() {
        let (handler, mut rx) = ChannelReloadHandler::new();
        let rt = ExtensionRuntime::builder("clipper")
            .platform(LINUX)
            .reload_handler(Arc::new(handler))
            .build()
            .unwrap();

        rt.reload().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().sequence, 1);

        drop(rx);
        assert!(matches!(rt.reload().await, Err(RuntimeError::ReloadRejected(_))));
    }

    #[tokio::test]
    async fn test_reload_without_handler_is_rejected() {
        assert!(matches!(runtime().reload().await, Err(RuntimeError::ReloadRejected(_))));
    }

    #[tokio::test]
    async fn test_send_message_labels_sender() {
        let (transport, mut rx) = ChannelTransport::new();
        let rt = ExtensionRuntime::builder("clipper")
            .platform(LINUX)
            .message_transport(Arc::new(transport))
            .build()
            .unwrap();

        rt.send_message(json!({"hello": "world"})).await.unwrap();
        let sent = rx.recv().await.unwrap();
        assert_eq!(sent.sender, "clipper");
        assert_eq!(sent.payload["hello"], "world");

        assert!(matches!(runtime().send_message(json!(null)).await, Err(RuntimeError::MessageRejected(_))));
    }

    #[tokio::test]
    async fn test_deliver_message_fans_out() {
        let rt = runtime();
        let recorder = record(&rt, &[EventKind::Message]).await;
        let msg = rt.deliver_message("other-ext", json!({"n": 1})).await;
        rt.deliver_message("other-ext", json!({"n": 2})).await;

        let events = recorder.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], RuntimeEvent::Message(msg));
    }

    #[tokio::test]
    async fn test_blocked_message_listener_does_not_block_lifecycle() {
        let rt = runtime();
        let gate = Arc::new(Notify::new());

        struct Gated {
            gate: Arc<Notify>,
        }

        #[async_trait]
        impl Listener for Gated {
            async fn handle(&self, _event: &RuntimeEvent) -> Result<()> {
                self.gate.notified().await;
                Ok(())
            }
        }

        rt.on_message().add_listener(Arc::new(Gated { gate: gate.clone() })).await;
        let pending = {
            let rt = rt.clone();
            tokio::spawn(async move { rt.deliver_message("peer", json!("hi")).await })
        };

        // Lifecycle traffic still flows while the message listener waits.
        let recorder = record(&rt, &[EventKind::ModuleLoad]).await;
        rt.load_module("a", None).await.unwrap();
        assert_eq!(recorder.len(), 1);

        gate.notify_one();
        let delivered = pending.await.unwrap();
        assert_eq!(delivered.sender, "peer");
    }

    #[tokio::test]
    async fn test_builder_rejects_empty_id() {
        let result = ExtensionRuntime::builder("").platform(LINUX).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_build_outside_tokio_is_error() {
        let result = ExtensionRuntime::builder("clipper").platform(LINUX).build();
        assert!(matches!(result, Err(RuntimeError::Other(_))));
    }

    #[tokio::test]
    async fn test_listener_awaiting_spawned_mutation_does_not_wedge_dispatch() {
        let rt = ExtensionRuntime::builder("clipper")
            .platform(LINUX)
            .version("1.0")
            .listener_timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let recorder = record(&rt, &[EventKind::ModuleLoad, EventKind::ExtensionClick]).await;

        // Waits on a mutation from another task; that mutation's delivery is
        // queued behind this very listener.
        struct LoadCompanion {
            rt: ExtensionRuntime,
        }

        #[async_trait]
        impl Listener for LoadCompanion {
            async fn handle(&self, event: &RuntimeEvent) -> Result<()> {
                if event.module_id() == Some("a") {
                    let rt = self.rt.clone();
                    tokio::spawn(async move { rt.load_module("b", None).await }).await??;
                }
                Ok(())
            }
        }

        let companion: ListenerRef = Arc::new(LoadCompanion { rt: rt.clone() });
        rt.on_module_load().add_listener(companion.clone()).await;

        let loaded = tokio::time::timeout(Duration::from_secs(3), rt.load_module("a", None)).await;
        assert!(matches!(loaded, Ok(Ok(_))));
        let clicked = tokio::time::timeout(Duration::from_secs(1), rt.notify_clicked()).await;
        assert!(clicked.is_ok());

        assert_eq!(rt.get_modules().await, vec!["a", "b"]);
        let kinds: Vec<EventKind> = recorder.events().iter().map(RuntimeEvent::kind).collect();
        assert_eq!(kinds, vec![EventKind::ModuleLoad, EventKind::ModuleLoad, EventKind::ExtensionClick]);
        assert!(rt.on_module_load().remove_listener(&companion).await);
    }
}
