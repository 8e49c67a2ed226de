//! # Cluster Bus Façade
//!
//! One instance per node and namespace. Owns the publisher, the listen loop,
//! the liveness view, the request coordinator and their background tasks, and
//! hands every event meant for the owning layer to an [`InboundStream`].
//!
//! ## Inbound path
//!
//! 1. Decode the frame; undecodable payloads are reported and skipped.
//! 2. Record the sender in the liveness view (own heartbeats included).
//! 3. Drop self-authored events, unless this node counts itself in its own
//!    requests and the event belongs to a request.
//! 4. Resolve attachment headers.
//! 5. Heartbeats stop here; an initial heartbeat from a peer is answered.
//! 6. Responses and acks go to the coordinator; everything else to the owning layer.

use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use cluster_types::{
    AttachmentHeader, BroadcastOptions, ClusterEvent, Envelope, Frame, NodeId, Packet, RequestId, Room,
    SocketDetails,
};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::config::{BusConfig, ErrorHandler};
use crate::domain::{AckGathered, Gathered, ListenerState, ReconnectBackoff};
use crate::error::BusError;
use crate::ports::{AttachmentStore, Backend, ClusterBusApi};
use crate::service::cleanup::cleanup_task;
use crate::service::coordinator::{RequestCoordinator, Response};
use crate::service::listener::Listener;
use crate::service::liveness::{heartbeat_task, sweep_task, LivenessTracker};
use crate::service::publisher::{PublishOutcome, Publisher};

/// An event for the owning messaging layer.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub sender: NodeId,
    pub event: ClusterEvent,
}

/// Events for the owning layer, in arrival order.
///
/// Ends when the listen loop stops, either on [`ClusterBus::close`] or after a
/// fatal listener failure.
pub struct InboundStream {
    inner: ReceiverStream<InboundEvent>,
}

impl InboundStream {
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        self.inner.next().await
    }
}

impl Stream for InboundStream {
    type Item = InboundEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// State shared by the façade and its background tasks.
struct Inner {
    node_id: NodeId,
    channel: String,
    publisher: Arc<Publisher>,
    liveness: Arc<LivenessTracker>,
    coordinator: RequestCoordinator,
    attachments: Arc<dyn AttachmentStore>,
    requests_timeout: Duration,
    count_self: bool,
    error_handler: ErrorHandler,
}

impl Inner {
    /// Publish from a background task; failures go to the error handler.
    async fn send(&self, event: ClusterEvent) {
        if let Err(err) = self.publisher.publish(event).await {
            (self.error_handler)(&err);
        }
    }

    async fn handle_raw(&self, raw: &str, inbound: &mpsc::Sender<InboundEvent>) {
        let frame = match Frame::decode(raw) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(channel = %self.channel, error = %err, "Undecodable payload skipped");
                (self.error_handler)(&BusError::Decode(err));
                return;
            }
        };

        let sender = frame.sender().clone();
        self.liveness.observe(&sender);
        if sender == self.node_id && !self.count_self {
            return;
        }

        let envelope = match frame {
            Frame::Inline(envelope) => envelope,
            Frame::Attachment(header) => match self.open_attachment(header).await {
                Some(envelope) => envelope,
                None => return,
            },
        };

        if envelope.is_from(&self.node_id) && envelope.event.request_id().is_none() {
            return;
        }
        self.dispatch(envelope, inbound).await;
    }

    async fn open_attachment(&self, header: AttachmentHeader) -> Option<Envelope> {
        let id = header.attachment_id;
        match self.attachments.fetch(id).await {
            Ok(Some(bytes)) => match Envelope::decode_bytes(&bytes) {
                Ok(envelope) => Some(envelope),
                Err(err) => {
                    warn!(attachment_id = %id, error = %err, "Undecodable attachment skipped");
                    (self.error_handler)(&BusError::Decode(err));
                    None
                }
            },
            Ok(None) => {
                warn!(attachment_id = %id, kind = %header.kind, sender = %header.uid, "Attachment not found");
                (self.error_handler)(&BusError::AttachmentMissing(id));
                None
            }
            Err(err) => {
                warn!(attachment_id = %id, error = %err, "Attachment fetch failed");
                (self.error_handler)(&BusError::Transport(err));
                None
            }
        }
    }

    async fn dispatch(&self, envelope: Envelope, inbound: &mpsc::Sender<InboundEvent>) {
        let Envelope { uid, event } = envelope;
        match event {
            ClusterEvent::Heartbeat => {}
            ClusterEvent::InitialHeartbeat => {
                debug!(node = %self.node_id, peer = %uid, "Answering initial heartbeat");
                self.send(ClusterEvent::Heartbeat).await;
            }
            event => {
                let Some(event) = self.coordinator.on_response(event) else {
                    return;
                };
                let kind = event.kind();
                match inbound.try_send(InboundEvent { sender: uid, event }) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(node = %self.node_id, kind = %kind, "Inbound buffer full, event dropped");
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(node = %self.node_id, kind = %kind, "Inbound stream gone, event dropped");
                    }
                }
            }
        }
    }

    fn timeout_for(&self, opts: &BroadcastOptions) -> Duration {
        opts.flags
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.requests_timeout)
    }
}

async fn listen_loop(
    inner: Arc<Inner>,
    mut listener: Listener,
    inbound: mpsc::Sender<InboundEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            received = listener.next() => match received {
                Ok(raw) => inner.handle_raw(&raw, &inbound).await,
                Err(err) => {
                    error!(node = %inner.node_id, channel = %inner.channel, error = %err, "Listen loop aborted");
                    (inner.error_handler)(&err);
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
    debug!(node = %inner.node_id, "Listen loop stopped");
}

/// Announce this node every time the subscription is (re)established.
async fn announce_task(
    inner: Arc<Inner>,
    mut state: watch::Receiver<ListenerState>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                if current == ListenerState::Listening {
                    inner.send(ClusterEvent::InitialHeartbeat).await;
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Cluster bus of one node on one namespace.
pub struct ClusterBus {
    inner: Arc<Inner>,
    namespace: String,
    listener_state: watch::Receiver<ListenerState>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ClusterBus {
    /// Validate `config`, subscribe to the namespace channel and start the
    /// background tasks. Must be called inside a tokio runtime.
    pub fn start(config: BusConfig, namespace: &str, backend: Backend) -> Result<(Self, InboundStream), BusError> {
        config.validate()?;

        let node_id = config.uid.clone().unwrap_or_else(NodeId::random);
        let channel = config.channel_for(namespace);
        let publisher = Arc::new(Publisher::new(
            node_id.clone(),
            channel.clone(),
            backend.transport.clone(),
            backend.attachments.clone(),
            &config,
        ));
        let liveness = Arc::new(LivenessTracker::new(
            node_id.clone(),
            config.heartbeat_timeout,
            config.count_self_in_requests,
        ));
        let inner = Arc::new(Inner {
            node_id: node_id.clone(),
            channel: channel.clone(),
            publisher: publisher.clone(),
            liveness: liveness.clone(),
            coordinator: RequestCoordinator::new(publisher.clone(), liveness.clone()),
            attachments: backend.attachments.clone(),
            requests_timeout: config.requests_timeout,
            count_self: config.count_self_in_requests,
            error_handler: config.error_handler.clone(),
        });

        let listener = Listener::new(
            backend.subscriber.clone(),
            channel.clone(),
            ReconnectBackoff::new(config.listen_backoff_initial, config.listen_backoff_max),
        );
        let listener_state = listener.subscribe_state();
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tasks = vec![
            tokio::spawn(announce_task(inner.clone(), listener.subscribe_state(), shutdown_rx.clone())),
            tokio::spawn(listen_loop(inner.clone(), listener, inbound_tx, shutdown_rx.clone())),
            tokio::spawn(heartbeat_task(
                publisher,
                config.heartbeat_interval,
                config.error_handler.clone(),
                shutdown_rx.clone(),
            )),
            tokio::spawn(sweep_task(liveness, config.heartbeat_interval, shutdown_rx.clone())),
            tokio::spawn(cleanup_task(
                backend.attachments,
                config.cleanup_interval,
                config.error_handler.clone(),
                shutdown_rx,
            )),
        ];

        info!(node = %node_id, channel = %channel, "Cluster bus started");
        let bus = Self {
            inner,
            namespace: namespace.to_string(),
            listener_state,
            shutdown: shutdown_tx,
            tasks: Mutex::new(tasks),
        };
        let stream = InboundStream {
            inner: ReceiverStream::new(inbound_rx),
        };
        Ok((bus, stream))
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    #[must_use]
    pub fn listener_state(&self) -> ListenerState {
        *self.listener_state.borrow()
    }

    /// Outstanding scatter/gather requests and acknowledged broadcasts.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.coordinator.pending_requests()
    }

    /// Stop every background task and wait for them. Idempotent.
    ///
    /// Requests still waiting end at their own deadline.
    pub async fn close(&self) {
        self.shutdown.send_replace(true);
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(err) = task.await {
                warn!(node = %self.inner.node_id, error = %err, "Background task ended abnormally");
            }
        }
        let requests = self.inner.coordinator.request_stats();
        let acks = self.inner.coordinator.ack_stats();
        info!(
            node = %self.inner.node_id,
            channel = %self.inner.channel,
            requests = requests.total_registered.load(Ordering::Relaxed),
            acked_broadcasts = acks.total_registered.load(Ordering::Relaxed),
            timeouts = requests.total_timeouts.load(Ordering::Relaxed) + acks.total_timeouts.load(Ordering::Relaxed),
            "Cluster bus closed"
        );
    }

    async fn publish_unless_local(
        &self,
        opts: &BroadcastOptions,
        event: ClusterEvent,
    ) -> Result<PublishOutcome, BusError> {
        if opts.flags.local {
            return Ok(PublishOutcome::Skipped);
        }
        self.inner.publisher.publish(event).await
    }
}

impl Drop for ClusterBus {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

#[async_trait]
impl ClusterBusApi for ClusterBus {
    fn node_id(&self) -> &NodeId {
        &self.inner.node_id
    }

    fn known_nodes(&self) -> Vec<NodeId> {
        self.inner.liveness.nodes()
    }

    async fn publish(&self, event: ClusterEvent) -> Result<PublishOutcome, BusError> {
        self.inner.publisher.publish(event).await
    }

    async fn broadcast(&self, packet: Packet, opts: BroadcastOptions) -> Result<PublishOutcome, BusError> {
        if opts.flags.local {
            return Ok(PublishOutcome::Skipped);
        }
        let event = ClusterEvent::Broadcast {
            packet,
            opts,
            request_id: None,
        };
        self.inner.publisher.publish(event).await
    }

    async fn broadcast_with_ack(&self, packet: Packet, opts: BroadcastOptions) -> Result<AckGathered, BusError> {
        if opts.flags.local {
            return Ok(AckGathered {
                completed: true,
                ..AckGathered::default()
            });
        }
        let timeout = self.inner.timeout_for(&opts);
        self.inner.coordinator.broadcast_with_ack(packet, opts, timeout).await
    }

    async fn add_sockets(&self, opts: BroadcastOptions, rooms: Vec<Room>) -> Result<PublishOutcome, BusError> {
        let event = ClusterEvent::SocketsJoin {
            opts: opts.clone(),
            rooms,
        };
        self.publish_unless_local(&opts, event).await
    }

    async fn del_sockets(&self, opts: BroadcastOptions, rooms: Vec<Room>) -> Result<PublishOutcome, BusError> {
        let event = ClusterEvent::SocketsLeave {
            opts: opts.clone(),
            rooms,
        };
        self.publish_unless_local(&opts, event).await
    }

    async fn disconnect_sockets(&self, opts: BroadcastOptions, close: bool) -> Result<PublishOutcome, BusError> {
        let event = ClusterEvent::DisconnectSockets {
            opts: opts.clone(),
            close,
        };
        self.publish_unless_local(&opts, event).await
    }

    async fn fetch_sockets(&self, opts: BroadcastOptions) -> Result<Gathered<SocketDetails>, BusError> {
        if opts.flags.local {
            return Ok(Gathered::complete(Vec::new()));
        }
        let timeout = self.inner.timeout_for(&opts);
        let gathered = self
            .inner
            .coordinator
            .send_request(|request_id| ClusterEvent::FetchSockets { request_id, opts }, timeout)
            .await?;

        let sockets = gathered
            .responses
            .into_iter()
            .flat_map(|response| match response {
                Response::Sockets(sockets) => sockets,
                Response::Emit(_) => Vec::new(),
            })
            .collect();
        Ok(Gathered {
            responses: sockets,
            completed: gathered.completed,
        })
    }

    async fn server_side_emit(&self, packet: Vec<Value>) -> Result<PublishOutcome, BusError> {
        let event = ClusterEvent::ServerSideEmit {
            request_id: None,
            packet,
        };
        self.inner.publisher.publish(event).await
    }

    async fn server_side_emit_with_ack(&self, packet: Vec<Value>) -> Result<Gathered<Value>, BusError> {
        let gathered = self
            .inner
            .coordinator
            .send_request(
                |request_id| ClusterEvent::ServerSideEmit {
                    request_id: Some(request_id),
                    packet,
                },
                self.inner.requests_timeout,
            )
            .await?;

        let values = gathered
            .responses
            .into_iter()
            .filter_map(|response| match response {
                Response::Emit(value) => Some(value),
                Response::Sockets(_) => None,
            })
            .collect();
        Ok(Gathered {
            responses: values,
            completed: gathered.completed,
        })
    }

    async fn reply_fetch_sockets(
        &self,
        request_id: RequestId,
        sockets: Vec<SocketDetails>,
    ) -> Result<PublishOutcome, BusError> {
        let event = ClusterEvent::FetchSocketsResponse { request_id, sockets };
        self.inner.publisher.publish(event).await
    }

    async fn reply_server_side_emit(&self, request_id: RequestId, packet: Value) -> Result<PublishOutcome, BusError> {
        let event = ClusterEvent::ServerSideEmitResponse { request_id, packet };
        self.inner.publisher.publish(event).await
    }

    async fn report_client_count(&self, request_id: RequestId, client_count: u64) -> Result<PublishOutcome, BusError> {
        let event = ClusterEvent::BroadcastClientCount {
            request_id,
            client_count,
        };
        self.inner.publisher.publish(event).await
    }

    async fn ack_broadcast(&self, request_id: RequestId, packet: Value) -> Result<PublishOutcome, BusError> {
        let event = ClusterEvent::BroadcastAck { request_id, packet };
        self.inner.publisher.publish(event).await
    }
}
