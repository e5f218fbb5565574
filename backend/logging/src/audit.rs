//! Runtime Event Audit Trail
//!
//! A listener that writes every dispatched event to the `runtime_events`
//! tracing target, which the file layer persists as NDJSON.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use exthost_core::RuntimeEvent;
use exthost_events::Listener;

use crate::redact::redact_value;

#[derive(Debug, Serialize)]
pub struct AuditEntry {
    pub extension: String,
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub event: serde_json::Value,
}

impl AuditEntry {
    /// Build an entry, redacting message payloads.
    pub fn from_event(extension: &str, event: &RuntimeEvent) -> Result<Self> {
        let mut value = serde_json::to_value(event)?;
        if let RuntimeEvent::Message(msg) = event {
            value["payload"] = redact_value(&msg.payload);
        }
        Ok(Self {
            extension: extension.to_string(),
            timestamp: Utc::now(),
            kind: event.kind().to_string(),
            event: value,
        })
    }
}

pub struct AuditListener {
    extension: String,
}

impl AuditListener {
    pub fn new(extension: impl Into<String>) -> Self {
        Self { extension: extension.into() }
    }
}

#[async_trait]
impl Listener for AuditListener {
    fn name(&self) -> &str {
        "audit_listener"
    }

    async fn handle(&self, event: &RuntimeEvent) -> Result<()> {
        let entry = AuditEntry::from_event(&self.extension, event)?;
        let line = serde_json::to_string(&entry)?;
        info!(target: "runtime_events", kind = %entry.kind, entry = %line, "Runtime event");
        Ok(())
    }
}
