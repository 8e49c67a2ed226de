//! # Envelope
//!
//! The unit of inter-node communication.
//!
//! ## Wire Forms
//!
//! - **Inline**: the full [`Envelope`], `{"uid": …, "type": …, <event fields>}`.
//! - **Attachment header**: `{"uid": …, "type": …, "attachment_id": n}` when the
//!   full envelope was relocated to the attachment table.

use crate::entities::{AttachmentId, NodeId};
use crate::errors::DecodeError;
use crate::events::{ClusterEvent, EventKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A cluster event stamped with the identity of the node that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The producing node. Sole authority for sender identity.
    pub uid: NodeId,

    #[serde(flatten)]
    pub event: ClusterEvent,
}

impl Envelope {
    pub fn new(uid: NodeId, event: ClusterEvent) -> Self {
        Self { uid, event }
    }

    /// Serialize to the transport encoding.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode an envelope previously stored as an attachment.
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Whether `node` authored this envelope.
    #[must_use]
    pub fn is_from(&self, node: &NodeId) -> bool {
        &self.uid == node
    }
}

/// Small stand-in published instead of an envelope that lives in the attachment table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentHeader {
    pub uid: NodeId,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub attachment_id: AttachmentId,
}

impl AttachmentHeader {
    pub fn new(uid: NodeId, kind: EventKind, attachment_id: AttachmentId) -> Self {
        Self {
            uid,
            kind,
            attachment_id,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A decoded channel payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Inline(Envelope),
    Attachment(AttachmentHeader),
}

impl Frame {
    /// Decode a raw notification payload.
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(raw)?;
        let Some(object) = value.as_object() else {
            return Err(DecodeError::NotAnObject);
        };

        if object.contains_key("attachment_id") {
            Ok(Self::Attachment(serde_json::from_value(value)?))
        } else {
            Ok(Self::Inline(serde_json::from_value(value)?))
        }
    }

    /// Sender of the frame, available without touching the attachment table.
    #[must_use]
    pub fn sender(&self) -> &NodeId {
        match self {
            Self::Inline(envelope) => &envelope.uid,
            Self::Attachment(header) => &header.uid,
        }
    }
}
