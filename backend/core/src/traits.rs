use anyhow::Result;
use async_trait::async_trait;

use crate::event::ExtensionMessage;
use crate::types::ExtensionUpdate;

/// External source of the latest published version of the running extension.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Source name for diagnostics (e.g., "http", "static").
    fn name(&self) -> &str;

    /// Fetch metadata for the latest available version.
    async fn latest(&self) -> Result<ExtensionUpdate>;
}

/// Host-side mechanism that actually restarts the extension.
///
/// `request_reload` returns once the request is handed off, not when the
/// reload has finished.
#[async_trait]
pub trait ReloadHandler: Send + Sync {
    async fn request_reload(&self) -> Result<()>;
}

/// Transport that carries outbound cross-extension messages.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Accept a message for delivery. Returns once the transport has taken ownership.
    async fn send(&self, message: ExtensionMessage) -> Result<()>;
}
