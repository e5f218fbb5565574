//! Channel-backed collaborators.
//!
//! The host owns the receiving end of each channel; the runtime only hands
//! requests off and reports whether the hand-off succeeded.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};

use exthost_core::{ExtensionMessage, MessageTransport, ReloadHandler};

/// Default channel buffer size for host hand-offs.
const DEFAULT_BUFFER_SIZE: usize = 16;

/// A reload request handed to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadRequest {
    /// Monotonic sequence number, starting at 1.
    pub sequence: u64,
}

/// Forwards reload requests to an `mpsc` receiver owned by the host.
pub struct ChannelReloadHandler {
    tx: mpsc::Sender<ReloadRequest>,
    next: AtomicU64,
}

impl ChannelReloadHandler {
    pub fn new() -> (Self, mpsc::Receiver<ReloadRequest>) {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(buffer: usize) -> (Self, mpsc::Receiver<ReloadRequest>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx, next: AtomicU64::new(1) }, rx)
    }
}

#[async_trait]
impl ReloadHandler for ChannelReloadHandler {
    async fn request_reload(&self) -> Result<()> {
        let sequence = self.next.fetch_add(1, Ordering::Relaxed);
        self.tx
            .send(ReloadRequest { sequence })
            .await
            .map_err(|_| anyhow!("host reload channel closed"))?;
        info!(sequence, "Reload request handed off");
        Ok(())
    }
}

/// Forwards outbound messages to an `mpsc` receiver owned by the transport layer.
pub struct ChannelTransport {
    tx: mpsc::Sender<ExtensionMessage>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::Receiver<ExtensionMessage>) {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(buffer: usize) -> (Self, mpsc::Receiver<ExtensionMessage>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl MessageTransport for ChannelTransport {
    async fn send(&self, message: ExtensionMessage) -> Result<()> {
        let id = message.id;
        self.tx
            .send(message)
            .await
            .map_err(|_| anyhow!("message transport closed"))?;
        debug!(message_id = %id, "Message handed to transport");
        Ok(())
    }
}
