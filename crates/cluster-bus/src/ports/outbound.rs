//! # Driven Ports (Outbound SPI)
//!
//! Interfaces the host must provide. The `postgres` feature ships
//! implementations backed by `pg_notify`, `LISTEN` and an attachment table.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cluster_types::AttachmentId;
use futures::Stream;

use crate::error::TransportError;

/// Raw payloads received on a subscribed channel.
///
/// An `Err` item means the subscription is broken; the stream is not polled again.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Fire-and-forget publish on a named channel.
///
/// Payloads are text and must stay under the transport ceiling (about 8000
/// bytes for Postgres). Delivery is at-most-once and unordered.
#[async_trait]
pub trait NotifyTransport: Send + Sync {
    async fn notify(&self, channel: &str, payload: &str) -> Result<(), TransportError>;
}

/// Subscription side of the channel.
#[async_trait]
pub trait ChannelSubscriber: Send + Sync {
    /// Subscribe to `channel`.
    ///
    /// The subscription must be established and committed before this returns,
    /// so nothing published afterwards is missed by the returned stream.
    async fn listen(&self, channel: &str) -> Result<NotificationStream, TransportError>;
}

/// Durable side storage for payloads the channel cannot carry.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Persist `payload` under a fresh id.
    async fn store(&self, payload: &[u8]) -> Result<AttachmentId, TransportError>;

    /// Read an attachment. `Ok(None)` is a normal miss (e.g. already cleaned up).
    async fn fetch(&self, id: AttachmentId) -> Result<Option<Vec<u8>>, TransportError>;

    /// Delete attachments older than `age`. Returns how many were removed.
    async fn delete_older_than(&self, age: Duration) -> Result<u64, TransportError>;
}

/// The driven ports one bus instance runs on.
///
/// Several buses (one per namespace) may share the same backend.
#[derive(Clone)]
pub struct Backend {
    pub transport: Arc<dyn NotifyTransport>,
    pub subscriber: Arc<dyn ChannelSubscriber>,
    pub attachments: Arc<dyn AttachmentStore>,
}
