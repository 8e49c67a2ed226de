//! # Driving Port (Inbound API)
//!
//! What the owning messaging layer calls. Inbound traffic for that layer is
//! delivered separately through [`crate::service::InboundStream`].

use async_trait::async_trait;
use cluster_types::{BroadcastOptions, ClusterEvent, NodeId, Packet, RequestId, Room, SocketDetails};
use serde_json::Value;

use crate::domain::{AckGathered, Gathered};
use crate::error::BusError;
use crate::service::PublishOutcome;

/// Cluster-wide operations of one node.
///
/// Methods return `Err` only for unexpected transport failures. Transient
/// failures and encoding problems go to the configured error handler and yield
/// [`PublishOutcome::Dropped`] (or an empty partial result for requests).
/// A request timeout is never an error.
#[async_trait]
pub trait ClusterBusApi: Send + Sync {
    /// Identity stamped on every envelope this node sends.
    fn node_id(&self) -> &NodeId;

    /// Nodes currently considered alive, this node included once heard from.
    fn known_nodes(&self) -> Vec<NodeId>;

    /// Publish a raw event.
    async fn publish(&self, event: ClusterEvent) -> Result<PublishOutcome, BusError>;

    /// Deliver a packet on every other node. Skipped when `opts.flags.local` is set.
    async fn broadcast(&self, packet: Packet, opts: BroadcastOptions) -> Result<PublishOutcome, BusError>;

    /// Broadcast and gather client acknowledgements from every other node.
    ///
    /// Waits up to `opts.flags.timeout_ms`, or the configured request timeout.
    async fn broadcast_with_ack(&self, packet: Packet, opts: BroadcastOptions) -> Result<AckGathered, BusError>;

    async fn add_sockets(&self, opts: BroadcastOptions, rooms: Vec<Room>) -> Result<PublishOutcome, BusError>;

    async fn del_sockets(&self, opts: BroadcastOptions, rooms: Vec<Room>) -> Result<PublishOutcome, BusError>;

    async fn disconnect_sockets(&self, opts: BroadcastOptions, close: bool) -> Result<PublishOutcome, BusError>;

    /// Sockets matching `opts` on every other node, flattened in arrival order.
    async fn fetch_sockets(&self, opts: BroadcastOptions) -> Result<Gathered<SocketDetails>, BusError>;

    /// Re-emit on every other node without waiting for responses.
    async fn server_side_emit(&self, packet: Vec<Value>) -> Result<PublishOutcome, BusError>;

    /// Re-emit on every other node and gather one response per node.
    async fn server_side_emit_with_ack(&self, packet: Vec<Value>) -> Result<Gathered<Value>, BusError>;

    // =========================================================================
    // RESPONDERS (answering requests received through the inbound stream)
    // =========================================================================

    async fn reply_fetch_sockets(
        &self,
        request_id: RequestId,
        sockets: Vec<SocketDetails>,
    ) -> Result<PublishOutcome, BusError>;

    async fn reply_server_side_emit(&self, request_id: RequestId, packet: Value) -> Result<PublishOutcome, BusError>;

    /// Report how many local clients an acknowledged broadcast reached.
    async fn report_client_count(&self, request_id: RequestId, client_count: u64) -> Result<PublishOutcome, BusError>;

    /// Forward one client's acknowledgement of an acknowledged broadcast.
    async fn ack_broadcast(&self, request_id: RequestId, packet: Value) -> Result<PublishOutcome, BusError>;
}
