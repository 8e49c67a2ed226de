//! # Request Coordinator
//!
//! Scatter/gather over the cluster channel. A request is registered before it
//! is published, so a response that overtakes the publish call is not lost.
//! Requests always end at their deadline: the caller gets whatever arrived and
//! a `completed` flag.

use std::sync::Arc;
use std::time::Duration;

use cluster_types::{BroadcastOptions, ClusterEvent, Packet, RequestId, SocketDetails};
use serde_json::Value;
use tracing::debug;

use crate::domain::{AckGathered, AckRegistry, Gathered, PendingRegistry, PendingStats, RespondOutcome};
use crate::error::BusError;
use crate::service::liveness::LivenessTracker;
use crate::service::publisher::{PublishOutcome, Publisher};

/// One node's answer to a scatter/gather request.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Sockets(Vec<SocketDetails>),
    Emit(Value),
}

/// Correlates requests with the responses of the other nodes.
pub struct RequestCoordinator {
    requests: PendingRegistry<Response>,
    acks: AckRegistry,
    liveness: Arc<LivenessTracker>,
    publisher: Arc<Publisher>,
}

impl RequestCoordinator {
    pub fn new(publisher: Arc<Publisher>, liveness: Arc<LivenessTracker>) -> Self {
        Self {
            requests: PendingRegistry::new(),
            acks: AckRegistry::new(),
            liveness,
            publisher,
        }
    }

    /// Publish the request built by `build` and gather one response per live node.
    ///
    /// With no other live node this returns an empty, completed result without
    /// publishing. A dropped publish returns an empty partial result.
    pub async fn send_request(
        &self,
        build: impl FnOnce(RequestId) -> ClusterEvent + Send,
        timeout: Duration,
    ) -> Result<Gathered<Response>, BusError> {
        let request_id = RequestId::new();
        let event = build(request_id);
        let kind = event.kind();
        let expected = self.liveness.expected_responses();

        let receiver = self.requests.register(request_id, kind, expected);
        if expected == 0 {
            debug!(request_id = %request_id, kind = %kind, "No peers to ask");
            return Ok(Gathered::complete(Vec::new()));
        }

        match self.publisher.publish(event).await {
            Ok(outcome) if outcome.is_delivered() => {}
            Ok(_) => {
                return Ok(Gathered::partial(self.requests.expire(request_id).unwrap_or_default()));
            }
            Err(err) => {
                self.requests.expire(request_id);
                return Err(err);
            }
        }

        Ok(self.requests.wait(request_id, receiver, timeout).await)
    }

    /// Broadcast `packet` and gather client acknowledgements.
    ///
    /// Completes once every live node reported its client count and that many
    /// acks arrived.
    pub async fn broadcast_with_ack(
        &self,
        packet: Packet,
        opts: BroadcastOptions,
        timeout: Duration,
    ) -> Result<AckGathered, BusError> {
        let request_id = RequestId::new();
        let expected = self.liveness.expected_responses();
        let receiver = self.acks.register(request_id, expected);

        let event = ClusterEvent::Broadcast {
            packet,
            opts,
            request_id: Some(request_id),
        };
        match self.publisher.publish(event).await {
            Ok(PublishOutcome::Dropped | PublishOutcome::Skipped) => {
                let (acks, client_count) = self.acks.expire(request_id).unwrap_or_default();
                return Ok(AckGathered {
                    acks,
                    client_count,
                    completed: false,
                });
            }
            Ok(_) => {}
            Err(err) => {
                self.acks.expire(request_id);
                return Err(err);
            }
        }

        Ok(self.acks.wait(request_id, receiver, timeout).await)
    }

    /// Route a response or ack to its pending request.
    ///
    /// Returns the event back when it is neither. Responses to unknown or
    /// finished requests are dropped.
    pub fn on_response(&self, event: ClusterEvent) -> Option<ClusterEvent> {
        let outcome = match event {
            ClusterEvent::FetchSocketsResponse { request_id, sockets } => {
                self.requests.respond(request_id, Response::Sockets(sockets))
            }
            ClusterEvent::ServerSideEmitResponse { request_id, packet } => {
                self.requests.respond(request_id, Response::Emit(packet))
            }
            ClusterEvent::BroadcastClientCount {
                request_id,
                client_count,
            } => self.acks.report_count(request_id, client_count),
            ClusterEvent::BroadcastAck { request_id, packet } => self.acks.ack(request_id, packet),
            other => return Some(other),
        };
        if outcome == RespondOutcome::Unknown {
            debug!(node = %self.publisher.node_id(), "Response to a peer's or an expired request dropped");
        }
        None
    }

    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.requests.pending_count() + self.acks.pending_count()
    }

    #[must_use]
    pub fn request_stats(&self) -> &PendingStats {
        self.requests.stats()
    }

    #[must_use]
    pub fn ack_stats(&self) -> &PendingStats {
        self.acks.stats()
    }
}
