//! Inbound event handling for a node with no local sockets.
//!
//! Room operations and broadcasts are logged. Requests are answered with empty
//! local results so requesting nodes complete without waiting for the deadline.
//!
//! A node that can no longer hear the cluster must leave it: peers keep
//! counting it in their requests for as long as it heartbeats.

use std::future::Future;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use cluster_bus::{BusError, ClusterBus, ClusterBusApi, InboundEvent, InboundStream, ListenerState, PublishOutcome};
use cluster_types::ClusterEvent;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// A responder whose inbound stream has ended.
#[derive(Debug, Clone, PartialEq)]
pub struct Ended {
    pub namespace: String,
    pub listener: ListenerState,
}

/// Serve `events` until the stream ends.
pub async fn serve(bus: Arc<ClusterBus>, mut events: InboundStream) -> Ended {
    while let Some(inbound) = events.recv().await {
        if let Err(err) = respond(bus.as_ref(), inbound).await {
            warn!(namespace = %bus.namespace(), error = %err, "Reply failed");
        }
    }
    let ended = Ended {
        namespace: bus.namespace().to_string(),
        listener: bus.listener_state(),
    };
    info!(namespace = %ended.namespace, state = %ended.listener, "Inbound stream ended");
    ended
}

/// Run until `shutdown` resolves or any responder stops on its own.
///
/// Every bus is closed either way. A responder stopping first is an error, so
/// the process exits instead of heartbeating while deaf.
pub async fn supervise<F>(
    buses: &[Arc<ClusterBus>],
    mut servers: JoinSet<Ended>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = std::io::Result<()>>,
{
    let outcome = tokio::select! {
        signal = shutdown => {
            info!("Initiating graceful shutdown...");
            signal.context("cannot listen for shutdown signal")
        }
        Some(joined) = servers.join_next() => match joined {
            Ok(ended) if ended.listener.is_fatal() => {
                error!(namespace = %ended.namespace, "Listener failed, leaving the cluster");
                Err(anyhow!("listener for namespace {} failed", ended.namespace))
            }
            Ok(ended) => Err(anyhow!(
                "inbound stream for namespace {} ended unexpectedly (listener {})",
                ended.namespace,
                ended.listener
            )),
            Err(err) => Err(anyhow!(err).context("responder task failed")),
        },
    };

    for bus in buses {
        bus.close().await;
    }
    while let Some(joined) = servers.join_next().await {
        if let Err(err) = joined {
            warn!(error = %err, "Responder task ended abnormally");
        }
    }
    outcome
}

/// Handle one inbound event. Returns the outcome of the reply, if one was sent.
pub async fn respond(bus: &impl ClusterBusApi, inbound: InboundEvent) -> Result<Option<PublishOutcome>, BusError> {
    let InboundEvent { sender, event } = inbound;
    match event {
        ClusterEvent::FetchSockets { request_id, .. } => {
            debug!(peer = %sender, request_id = %request_id, "Answering fetch_sockets");
            bus.reply_fetch_sockets(request_id, Vec::new()).await.map(Some)
        }
        ClusterEvent::ServerSideEmit {
            request_id: Some(request_id),
            packet,
        } => {
            info!(peer = %sender, request_id = %request_id, packet = ?packet, "Server-side emit");
            bus.reply_server_side_emit(request_id, Value::Null).await.map(Some)
        }
        ClusterEvent::Broadcast {
            request_id: Some(request_id),
            ..
        } => bus.report_client_count(request_id, 0).await.map(Some),
        other => {
            info!(peer = %sender, kind = %other.kind(), "Cluster event");
            Ok(None)
        }
    }
}
