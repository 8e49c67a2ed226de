//! # Core Entities
//!
//! Identifiers and the payload shapes carried inside cluster events.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// A room name, as understood by the owning messaging layer.
pub type Room = String;

/// A socket identifier, as understood by the owning messaging layer.
pub type SocketId = String;

/// Identity of one node process.
///
/// Generated once at startup and stable for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier (8 random bytes, hex encoded).
    #[must_use]
    pub fn random() -> Self {
        Self(hex::encode(rand::random::<[u8; 8]>()))
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlates a scatter/gather request with its responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Allocate a new random request id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Primary key of a row in the attachment table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentId(i64);

impl AttachmentId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery flags attached to a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastFlags {
    /// Only deliver on the emitting node. Never forwarded to the cluster.
    #[serde(default)]
    pub local: bool,
    /// The packet may be dropped if a client is not ready.
    #[serde(default)]
    pub volatile: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compress: Option<bool>,
    /// Ack timeout requested by the emitter, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Target selection for a broadcast or a room operation.
///
/// An empty `rooms` list targets every socket of the namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastOptions {
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub except: Vec<Room>,
    #[serde(default)]
    pub flags: BroadcastFlags,
}

impl BroadcastOptions {
    /// Target every socket of the namespace.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Add a room to the target set.
    #[must_use]
    pub fn to_room(mut self, room: impl Into<Room>) -> Self {
        self.rooms.push(room.into());
        self
    }

    /// Exclude the sockets of a room.
    #[must_use]
    pub fn except_room(mut self, room: impl Into<Room>) -> Self {
        self.except.push(room.into());
        self
    }
}

/// A packet as produced by the owning messaging layer.
///
/// `data` is opaque JSON. Binary parts are kept apart so the publisher can tell
/// the envelope is not plain text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub nsp: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binary: Vec<Vec<u8>>,
}

impl Packet {
    pub fn new(nsp: impl Into<String>, data: Value) -> Self {
        Self {
            nsp: nsp.into(),
            data,
            binary: Vec::new(),
        }
    }

    /// Attach a binary part.
    #[must_use]
    pub fn with_binary(mut self, part: Vec<u8>) -> Self {
        self.binary.push(part);
        self
    }

    #[must_use]
    pub fn has_binary(&self) -> bool {
        !self.binary.is_empty()
    }
}

/// Serializable description of a socket living on some node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocketDetails {
    pub id: SocketId,
    #[serde(default)]
    pub handshake: Value,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub data: Value,
}
