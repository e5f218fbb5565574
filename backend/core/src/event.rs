use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ExtensionUpdate, ModuleState};

/// Categories of events the runtime dispatches to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The extension was installed
    Install,
    /// The extension is about to be uninstalled
    Uninstall,
    /// The extension was enabled
    Enable,
    /// The extension was disabled
    Disable,
    /// An update is available
    UpdateAvailable,
    /// A permission was granted to a module
    PermissionGrant,
    /// A permission was revoked from a module
    PermissionRevoke,
    /// A module was loaded
    ModuleLoad,
    /// A module was unloaded
    ModuleUnload,
    /// The extension was clicked in the dashboard
    ExtensionClick,
    /// A cross-extension message arrived
    Message,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::Install,
        EventKind::Uninstall,
        EventKind::Enable,
        EventKind::Disable,
        EventKind::UpdateAvailable,
        EventKind::PermissionGrant,
        EventKind::PermissionRevoke,
        EventKind::ModuleLoad,
        EventKind::ModuleUnload,
        EventKind::ExtensionClick,
        EventKind::Message,
    ];
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| format!("{:?}", self));
        write!(f, "{}", s)
    }
}

/// A cross-extension message, labelled with its sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionMessage {
    pub id: Uuid,
    pub sender: String,
    pub payload: serde_json::Value,
    pub sent_at: DateTime<Utc>,
}

impl ExtensionMessage {
    pub fn new(sender: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            payload,
            sent_at: Utc::now(),
        }
    }
}

/// An event with its payload. Each variant belongs to exactly one [`EventKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuntimeEvent {
    Install,
    Uninstall,
    Enable,
    Disable,
    UpdateAvailable(ExtensionUpdate),
    PermissionGrant { module: String, permission: String },
    PermissionRevoke { module: String, permission: String },
    ModuleLoad(ModuleState),
    ModuleUnload(ModuleState),
    ExtensionClick,
    Message(ExtensionMessage),
}

impl RuntimeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Install => EventKind::Install,
            Self::Uninstall => EventKind::Uninstall,
            Self::Enable => EventKind::Enable,
            Self::Disable => EventKind::Disable,
            Self::UpdateAvailable(_) => EventKind::UpdateAvailable,
            Self::PermissionGrant { .. } => EventKind::PermissionGrant,
            Self::PermissionRevoke { .. } => EventKind::PermissionRevoke,
            Self::ModuleLoad(_) => EventKind::ModuleLoad,
            Self::ModuleUnload(_) => EventKind::ModuleUnload,
            Self::ExtensionClick => EventKind::ExtensionClick,
            Self::Message(_) => EventKind::Message,
        }
    }

    /// The module this event concerns, if any.
    pub fn module_id(&self) -> Option<&str> {
        match self {
            Self::PermissionGrant { module, .. } | Self::PermissionRevoke { module, .. } => {
                Some(module)
            }
            Self::ModuleLoad(state) | Self::ModuleUnload(state) => Some(&state.id),
            _ => None,
        }
    }
}
