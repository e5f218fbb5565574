//! Typed configuration schema.
//!
//! Every field is optional in the file; [`crate::apply_all_defaults`] fills
//! in what the runtime needs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root of `config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<ExtensionConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updates: Option<UpdatesConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// The hosted extension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtensionConfig {
    /// Stable extension id, used as the sender of outbound messages.
    pub id: Option<String>,
    /// Running version; falls back to the manifest's `version`.
    pub version: Option<String>,
    /// Path to the extension's JSON manifest.
    pub manifest_path: Option<PathBuf>,
    /// Whether the extension starts enabled.
    pub enabled: Option<bool>,
    /// Longest time one event listener may run before it is abandoned.
    pub listener_timeout_ms: Option<u64>,
}

/// Update source settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdatesConfig {
    /// HTTP(S) endpoint serving `{version, version_name}`. Unset disables remote checks.
    pub url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub dir: Option<PathBuf>,
}

impl RuntimeConfig {
    pub fn extension_id(&self) -> Option<&str> {
        self.extension.as_ref()?.id.as_deref()
    }

    pub fn log_level(&self) -> &str {
        self.logging
            .as_ref()
            .and_then(|l| l.level.as_deref())
            .unwrap_or(crate::defaults::DEFAULT_LOG_LEVEL)
    }

    pub fn update_url(&self) -> Option<&str> {
        self.updates.as_ref()?.url.as_deref()
    }
}
