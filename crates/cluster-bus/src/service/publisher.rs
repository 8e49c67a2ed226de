//! # Publisher
//!
//! Encodes envelopes and hands them to the notify transport.
//!
//! - Envelopes above the threshold, or carrying binary data, are stored as an
//!   attachment first and replaced by a header referencing it.
//! - Transient failures are retried immediately, up to `publish_attempts` in
//!   total. After that the message is dropped and reported to the error handler.
//! - Anything else is returned to the caller.

use std::sync::Arc;

use cluster_types::{AttachmentHeader, AttachmentId, ClusterEvent, Envelope, NodeId};
use tracing::{debug, error, warn};

use crate::config::{BusConfig, ErrorHandler};
use crate::error::{BusError, TransportError};
use crate::ports::{AttachmentStore, NotifyTransport};

/// What happened to a published envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Sent inline in one notification.
    Sent,
    /// Stored as an attachment; a header was sent.
    Attached(AttachmentId),
    /// Dropped after a reported failure.
    Dropped,
    /// Nothing to send (e.g. a local-only broadcast).
    Skipped,
}

impl PublishOutcome {
    /// True when a notification went out.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Sent | Self::Attached(_))
    }
}

/// Sends envelopes of one node on one channel.
pub struct Publisher {
    node_id: NodeId,
    channel: String,
    transport: Arc<dyn NotifyTransport>,
    attachments: Arc<dyn AttachmentStore>,
    payload_threshold: usize,
    attempts: u32,
    error_handler: ErrorHandler,
}

impl Publisher {
    pub fn new(
        node_id: NodeId,
        channel: String,
        transport: Arc<dyn NotifyTransport>,
        attachments: Arc<dyn AttachmentStore>,
        config: &BusConfig,
    ) -> Self {
        Self {
            node_id,
            channel,
            transport,
            attachments,
            payload_threshold: config.payload_threshold,
            attempts: config.publish_attempts,
            error_handler: config.error_handler.clone(),
        }
    }

    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Publish `event` as this node.
    pub async fn publish(&self, event: ClusterEvent) -> Result<PublishOutcome, BusError> {
        let kind = event.kind();
        let force_attachment = event.has_binary();
        let envelope = Envelope::new(self.node_id.clone(), event);

        let encoded = match envelope.encode() {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(channel = %self.channel, kind = %kind, error = %err, "Cannot encode envelope");
                (self.error_handler)(&BusError::Serialization(err));
                return Ok(PublishOutcome::Dropped);
            }
        };

        if encoded.len() <= self.payload_threshold && !force_attachment {
            if !self.notify_with_retry(&encoded).await? {
                return Ok(PublishOutcome::Dropped);
            }
            debug!(channel = %self.channel, kind = %kind, bytes = encoded.len(), "Published");
            return Ok(PublishOutcome::Sent);
        }

        let Some(attachment_id) = self.store_with_retry(encoded.as_bytes()).await? else {
            return Ok(PublishOutcome::Dropped);
        };
        let header = AttachmentHeader::new(self.node_id.clone(), kind, attachment_id).encode()?;

        if !self.notify_with_retry(&header).await? {
            return Ok(PublishOutcome::Dropped);
        }
        debug!(
            channel = %self.channel,
            kind = %kind,
            bytes = encoded.len(),
            attachment_id = %attachment_id,
            "Published as attachment"
        );
        Ok(PublishOutcome::Attached(attachment_id))
    }

    /// `Ok(false)` when every attempt failed transiently.
    async fn notify_with_retry(&self, payload: &str) -> Result<bool, BusError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.notify(&self.channel, payload).await {
                Ok(()) => return Ok(true),
                Err(err) => {
                    if self.give_up(attempt, err)? {
                        return Ok(false);
                    }
                }
            }
        }
    }

    async fn store_with_retry(&self, payload: &[u8]) -> Result<Option<AttachmentId>, BusError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attachments.store(payload).await {
                Ok(id) => return Ok(Some(id)),
                Err(err) => {
                    if self.give_up(attempt, err)? {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Decide what a failed attempt means: retry (`Ok(false)`), drop
    /// (`Ok(true)`) or propagate (`Err`).
    fn give_up(&self, attempt: u32, err: TransportError) -> Result<bool, BusError> {
        if !err.is_transient() {
            error!(channel = %self.channel, error = %err, "Publish failed");
            return Err(BusError::Transport(err));
        }
        if attempt < self.attempts {
            warn!(channel = %self.channel, attempt = attempt, error = %err, "Publish failed, retrying");
            return Ok(false);
        }

        error!(channel = %self.channel, attempts = attempt, error = %err, "Publish failed, dropping message");
        (self.error_handler)(&BusError::PublishDropped {
            attempts: attempt,
            source: err,
        });
        Ok(true)
    }
}
