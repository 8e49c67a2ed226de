//! Cluster fixture shared by the integration flows.

use std::sync::Arc;
use std::time::Duration;

use cluster_bus::{BusConfig, ClusterBus, ClusterBusApi, InboundStream, MemoryAttachmentStore, MemoryHub};
use cluster_types::{ClusterEvent, NodeId, SocketDetails};
use parking_lot::Mutex;
use serde_json::json;
use tokio::task::JoinHandle;

pub const NAMESPACE: &str = "/";
pub const CHANNEL: &str = "socket.io#/";

/// Nodes sharing one hub and one attachment table.
pub struct Cluster {
    pub hub: Arc<MemoryHub>,
    pub store: Arc<MemoryAttachmentStore>,
}

pub struct Node {
    pub bus: Arc<ClusterBus>,
    pub events: InboundStream,
    /// Everything the node reported to its error handler.
    pub errors: Arc<Mutex<Vec<String>>>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.bus.node_id().clone()
    }
}

impl Cluster {
    pub fn new() -> Self {
        Self {
            hub: Arc::new(MemoryHub::new()),
            store: Arc::new(MemoryAttachmentStore::new()),
        }
    }

    pub fn config(uid: &str) -> BusConfig {
        BusConfig {
            uid: Some(NodeId::new(uid)),
            ..BusConfig::default()
        }
    }

    pub fn start(&self, uid: &str) -> Node {
        self.start_with(Self::config(uid), NAMESPACE)
    }

    pub fn start_with(&self, config: BusConfig, namespace: &str) -> Node {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let config = config.with_error_handler(move |err| sink.lock().push(err.to_string()));
        let (bus, events) = ClusterBus::start(config, namespace, self.hub.backend(self.store.clone())).unwrap();
        Node {
            bus: Arc::new(bus),
            events,
            errors,
        }
    }
}

impl Default for Cluster {
    fn default() -> Self {
        Self::new()
    }
}

/// Let in-flight notifications and their handlers run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// How a scripted node answers requests.
#[derive(Clone, Default)]
pub struct Script {
    /// Returned for every fetch_sockets request.
    pub sockets: Vec<SocketDetails>,
    /// Local clients reached by an acknowledged broadcast; each one acks.
    pub clients: u64,
    /// Delay before every answer.
    pub delay: Duration,
}

pub fn socket(id: &str) -> SocketDetails {
    SocketDetails {
        id: id.to_string(),
        ..SocketDetails::default()
    }
}

/// Answer every request arriving on `node` according to `script`.
///
/// Server-side emits are answered with the node id; broadcast acks with
/// `"{node}-{client}"`. Other events are collected and returned when the
/// stream ends.
pub fn serve(node: Node, script: Script) -> JoinHandle<Vec<ClusterEvent>> {
    let Node { bus, mut events, .. } = node;
    tokio::spawn(async move {
        let mut others = Vec::new();
        while let Some(inbound) = events.recv().await {
            let event = inbound.event;
            let is_request = matches!(
                event,
                ClusterEvent::FetchSockets { .. }
                    | ClusterEvent::ServerSideEmit { request_id: Some(_), .. }
                    | ClusterEvent::Broadcast { request_id: Some(_), .. }
            );
            if !is_request {
                others.push(event);
                continue;
            }

            let bus = bus.clone();
            let script = script.clone();
            tokio::spawn(async move {
                tokio::time::sleep(script.delay).await;
                answer(&bus, event, &script).await;
            });
        }
        others
    })
}

async fn answer(bus: &ClusterBus, event: ClusterEvent, script: &Script) {
    let node = bus.node_id().to_string();
    match event {
        ClusterEvent::FetchSockets { request_id, .. } => {
            bus.reply_fetch_sockets(request_id, script.sockets.clone()).await.unwrap();
        }
        ClusterEvent::ServerSideEmit {
            request_id: Some(request_id),
            ..
        } => {
            bus.reply_server_side_emit(request_id, json!(node)).await.unwrap();
        }
        ClusterEvent::Broadcast {
            request_id: Some(request_id),
            ..
        } => {
            bus.report_client_count(request_id, script.clients).await.unwrap();
            for client in 0..script.clients {
                bus.ack_broadcast(request_id, json!(format!("{node}-{client}")))
                    .await
                    .unwrap();
            }
        }
        _ => {}
    }
}
