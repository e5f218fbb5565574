//! Scripted command replay for `exthost run`.
//!
//! A script is a YAML list of steps:
//!
//! ```yaml
//! - op: load
//!   module: ui
//!   path: ui/index.js
//! - op: grant
//!   module: ui
//!   permission: storage
//! - op: message
//!   sender: other-extension
//!   payload: { hello: world }
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::warn;

use exthost_runtime::ExtensionRuntime;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Step {
    Install,
    Uninstall,
    Enable,
    Disable,
    Click,
    Load {
        module: String,
        #[serde(default)]
        path: Option<String>,
    },
    Unload {
        module: String,
    },
    Grant {
        module: String,
        permission: String,
    },
    Revoke {
        module: String,
        permission: String,
    },
    /// Inbound message from another extension.
    Message {
        sender: String,
        #[serde(default)]
        payload: Value,
    },
    /// Outbound message through the transport.
    Send {
        #[serde(default)]
        payload: Value,
    },
    CheckUpdate,
    Reload,
}

/// Result of one replayed step.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done(String),
    Rejected(String),
}

pub fn parse_script(raw: &str) -> Result<Vec<Step>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_yaml::from_str(raw).context("Failed to parse script YAML")
}

pub async fn load_script(path: &Path) -> Result<Vec<Step>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read script: {}", path.display()))?;
    parse_script(&raw).with_context(|| format!("Invalid script: {}", path.display()))
}

/// Run every step in order. A rejected step does not stop the replay.
pub async fn replay(runtime: &ExtensionRuntime, steps: &[Step]) -> Vec<Outcome> {
    let mut outcomes = Vec::with_capacity(steps.len());
    for (index, step) in steps.iter().enumerate() {
        let outcome = run_step(runtime, step).await;
        if let Outcome::Rejected(reason) = &outcome {
            warn!(step = index, reason = %reason, "Script step rejected");
        }
        outcomes.push(outcome);
    }
    outcomes
}

async fn run_step(runtime: &ExtensionRuntime, step: &Step) -> Outcome {
    let result = match step {
        Step::Install => {
            runtime.notify_installed().await;
            Ok("installed".to_string())
        }
        Step::Uninstall => {
            runtime.notify_uninstalling().await;
            Ok("uninstalling".to_string())
        }
        Step::Enable | Step::Disable => {
            let enabled = matches!(step, Step::Enable);
            let changed = runtime.set_enabled(enabled).await;
            Ok(format!("enabled={enabled} changed={changed}"))
        }
        Step::Click => {
            runtime.notify_clicked().await;
            Ok("clicked".to_string())
        }
        Step::Load { module, path } => runtime
            .load_module(module, path.as_deref())
            .await
            .map(|state| format!("loaded {}", state.id)),
        Step::Unload { module } => runtime
            .unload_module(module)
            .await
            .map(|state| format!("unloaded {}", state.id)),
        Step::Grant { module, permission } => runtime
            .grant_permission(module, permission)
            .await
            .map(|added| format!("grant {module} {permission} added={added}")),
        Step::Revoke { module, permission } => runtime
            .revoke_permission(module, permission)
            .await
            .map(|removed| format!("revoke {module} {permission} removed={removed}")),
        Step::Message { sender, payload } => {
            let message = runtime.deliver_message(sender, payload.clone()).await;
            Ok(format!("delivered {}", message.id))
        }
        Step::Send { payload } => runtime
            .send_message(payload.clone())
            .await
            .map(|()| "sent".to_string()),
        Step::CheckUpdate => {
            let check = runtime.request_update_check().await;
            Ok(match check.details() {
                Some(update) => format!("update available: {}", update.version),
                None => "no update".to_string(),
            })
        }
        Step::Reload => runtime.reload().await.map(|()| "reload requested".to_string()),
    };
    match result {
        Ok(summary) => Outcome::Done(summary),
        Err(e) => Outcome::Rejected(e.to_string()),
    }
}
