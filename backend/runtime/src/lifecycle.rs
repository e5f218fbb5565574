//! Extension lifecycle: install, enable/disable, uninstall.
//!
//! Each transition yields the event to dispatch, or `None` when nothing
//! changed (enabling an enabled extension emits nothing).

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use exthost_core::RuntimeEvent;

/// Current phase of the hosted extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionPhase {
    Enabled,
    Disabled,
    Uninstalling,
}

#[derive(Debug)]
pub struct ExtensionLifecycle {
    phase: ExtensionPhase,
}

impl ExtensionLifecycle {
    pub fn new(enabled: bool) -> Self {
        let phase = if enabled { ExtensionPhase::Enabled } else { ExtensionPhase::Disabled };
        Self { phase }
    }

    pub fn phase(&self) -> ExtensionPhase {
        self.phase
    }

    pub fn is_enabled(&self) -> bool {
        self.phase == ExtensionPhase::Enabled
    }

    /// The host finished installing (or reinstalling) the extension.
    pub fn install(&mut self) -> Option<RuntimeEvent> {
        self.phase = ExtensionPhase::Enabled;
        info!("Extension installed");
        Some(RuntimeEvent::Install)
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Option<RuntimeEvent> {
        match (self.phase, enabled) {
            (ExtensionPhase::Uninstalling, _) => {
                warn!(enabled, "Ignoring enable/disable while uninstalling");
                None
            }
            (ExtensionPhase::Enabled, true) | (ExtensionPhase::Disabled, false) => {
                debug!(enabled, "Extension already in requested state");
                None
            }
            (_, true) => {
                self.phase = ExtensionPhase::Enabled;
                info!("Extension enabled");
                Some(RuntimeEvent::Enable)
            }
            (_, false) => {
                self.phase = ExtensionPhase::Disabled;
                info!("Extension disabled");
                Some(RuntimeEvent::Disable)
            }
        }
    }

    /// The host is about to uninstall the extension.
    pub fn uninstall(&mut self) -> Option<RuntimeEvent> {
        if self.phase == ExtensionPhase::Uninstalling {
            return None;
        }
        self.phase = ExtensionPhase::Uninstalling;
        info!("Extension uninstalling");
        Some(RuntimeEvent::Uninstall)
    }
}

impl Default for ExtensionLifecycle {
    fn default() -> Self {
        Self::new(true)
    }
}
