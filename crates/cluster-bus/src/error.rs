//! # Error Types
//!
//! Two layers: [`TransportError`] is what the ports return, [`BusError`] is what
//! the bus reports to its error handler and, for unexpected failures, to callers.

use cluster_types::{AttachmentId, DecodeError};
use thiserror::Error;

use crate::config::ConfigError;

/// Failure reported by a transport, subscriber or attachment store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Connection drop or other operational failure. Worth retrying.
    #[error("Transient transport failure: {0}")]
    Transient(String),

    /// Anything else. Never retried.
    #[error("Transport failure: {0}")]
    Fatal(String),
}

impl TransportError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for TransportError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::WorkerCrashed => Self::Transient(err.to_string()),
            _ => Self::Fatal(err.to_string()),
        }
    }
}

/// Errors surfaced by the cluster bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// An outbound envelope could not be encoded.
    #[error("Cannot serialize envelope: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An inbound payload could not be decoded.
    #[error("Cannot decode inbound payload: {0}")]
    Decode(#[from] DecodeError),

    /// Every publish attempt hit a transient failure; the message was dropped.
    #[error("Message dropped after {attempts} attempts: {source}")]
    PublishDropped {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// Unexpected transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The listen loop hit an unexpected failure and stopped for good.
    #[error("Listener aborted: {0}")]
    ListenerAborted(String),

    /// A header referenced an attachment that no longer exists.
    #[error("Attachment {0} not found")]
    AttachmentMissing(AttachmentId),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The bus has been closed.
    #[error("Cluster bus closed")]
    Closed,
}
