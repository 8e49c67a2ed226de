//! # Cluster Events
//!
//! Every message kind that flows between nodes. The enum is internally tagged
//! by `type`, so a heartbeat on the wire is `{"uid":"…","type":"heartbeat"}`.

use crate::entities::{BroadcastOptions, Packet, RequestId, Room, SocketDetails};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// All events that can be published on the cluster channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClusterEvent {
    // =========================================================================
    // MEMBERSHIP
    // =========================================================================
    /// First heartbeat of a freshly started node. Peers answer with a
    /// [`ClusterEvent::Heartbeat`] so the newcomer learns them immediately.
    InitialHeartbeat,

    /// Periodic liveness signal.
    Heartbeat,

    // =========================================================================
    // FAN-OUT (no response expected)
    // =========================================================================
    /// Deliver a packet to the matching sockets of every node.
    ///
    /// When `request_id` is set the emitter wants acknowledgements: each node
    /// answers with one `BroadcastClientCount` and then one `BroadcastAck` per
    /// client response.
    Broadcast {
        packet: Packet,
        opts: BroadcastOptions,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
    },

    /// Make the matching sockets join `rooms`.
    SocketsJoin {
        opts: BroadcastOptions,
        rooms: Vec<Room>,
    },

    /// Make the matching sockets leave `rooms`.
    SocketsLeave {
        opts: BroadcastOptions,
        rooms: Vec<Room>,
    },

    /// Disconnect the matching sockets.
    DisconnectSockets {
        opts: BroadcastOptions,
        close: bool,
    },

    // =========================================================================
    // SCATTER/GATHER
    // =========================================================================
    /// Ask every node for the sockets matching `opts`.
    FetchSockets {
        request_id: RequestId,
        opts: BroadcastOptions,
    },

    /// One node's answer to [`ClusterEvent::FetchSockets`].
    FetchSocketsResponse {
        request_id: RequestId,
        sockets: Vec<SocketDetails>,
    },

    /// Re-emit `packet` on every other node. Responses are only expected when
    /// `request_id` is set.
    ServerSideEmit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
        packet: Vec<Value>,
    },

    /// One node's answer to an acknowledged [`ClusterEvent::ServerSideEmit`].
    ServerSideEmitResponse {
        request_id: RequestId,
        packet: Value,
    },

    // =========================================================================
    // BROADCAST ACKNOWLEDGEMENTS
    // =========================================================================
    /// Number of local clients a node targeted for an acknowledged broadcast.
    BroadcastClientCount {
        request_id: RequestId,
        client_count: u64,
    },

    /// A single client acknowledgement for an acknowledged broadcast.
    BroadcastAck {
        request_id: RequestId,
        packet: Value,
    },
}

/// Field-less discriminant of [`ClusterEvent`], used in attachment headers and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    InitialHeartbeat,
    Heartbeat,
    Broadcast,
    SocketsJoin,
    SocketsLeave,
    DisconnectSockets,
    FetchSockets,
    FetchSocketsResponse,
    ServerSideEmit,
    ServerSideEmitResponse,
    BroadcastClientCount,
    BroadcastAck,
}

impl EventKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InitialHeartbeat => "initial_heartbeat",
            Self::Heartbeat => "heartbeat",
            Self::Broadcast => "broadcast",
            Self::SocketsJoin => "sockets_join",
            Self::SocketsLeave => "sockets_leave",
            Self::DisconnectSockets => "disconnect_sockets",
            Self::FetchSockets => "fetch_sockets",
            Self::FetchSocketsResponse => "fetch_sockets_response",
            Self::ServerSideEmit => "server_side_emit",
            Self::ServerSideEmitResponse => "server_side_emit_response",
            Self::BroadcastClientCount => "broadcast_client_count",
            Self::BroadcastAck => "broadcast_ack",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ClusterEvent {
    /// Discriminant of this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::InitialHeartbeat => EventKind::InitialHeartbeat,
            Self::Heartbeat => EventKind::Heartbeat,
            Self::Broadcast { .. } => EventKind::Broadcast,
            Self::SocketsJoin { .. } => EventKind::SocketsJoin,
            Self::SocketsLeave { .. } => EventKind::SocketsLeave,
            Self::DisconnectSockets { .. } => EventKind::DisconnectSockets,
            Self::FetchSockets { .. } => EventKind::FetchSockets,
            Self::FetchSocketsResponse { .. } => EventKind::FetchSocketsResponse,
            Self::ServerSideEmit { .. } => EventKind::ServerSideEmit,
            Self::ServerSideEmitResponse { .. } => EventKind::ServerSideEmitResponse,
            Self::BroadcastClientCount { .. } => EventKind::BroadcastClientCount,
            Self::BroadcastAck { .. } => EventKind::BroadcastAck,
        }
    }

    /// Whether the event carries non-text content that cannot ride the channel.
    #[must_use]
    pub fn has_binary(&self) -> bool {
        match self {
            Self::Broadcast { packet, .. } => packet.has_binary(),
            _ => false,
        }
    }

    /// The correlation id, when the event participates in a request flow.
    #[must_use]
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::Broadcast { request_id, .. } | Self::ServerSideEmit { request_id, .. } => {
                *request_id
            }
            Self::FetchSockets { request_id, .. }
            | Self::FetchSocketsResponse { request_id, .. }
            | Self::ServerSideEmitResponse { request_id, .. }
            | Self::BroadcastClientCount { request_id, .. }
            | Self::BroadcastAck { request_id, .. } => Some(*request_id),
            Self::InitialHeartbeat
            | Self::Heartbeat
            | Self::SocketsJoin { .. }
            | Self::SocketsLeave { .. }
            | Self::DisconnectSockets { .. } => None,
        }
    }
}
