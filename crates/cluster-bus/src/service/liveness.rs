//! # Liveness Tracker
//!
//! Shared view of which nodes are alive, fed by every inbound envelope, plus
//! the two background tasks that keep it current: the heartbeat emitter and
//! the stale-node sweep.

use std::sync::Arc;
use std::time::Duration;

use cluster_types::{ClusterEvent, NodeId};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ErrorHandler;
use crate::domain::LivenessMap;
use crate::service::publisher::Publisher;

/// Thread-safe wrapper over [`LivenessMap`] for one node.
pub struct LivenessTracker {
    node_id: NodeId,
    map: Mutex<LivenessMap>,
    timeout: Duration,
    count_self: bool,
}

impl LivenessTracker {
    pub fn new(node_id: NodeId, timeout: Duration, count_self: bool) -> Self {
        Self {
            node_id,
            map: Mutex::new(LivenessMap::new()),
            timeout,
            count_self,
        }
    }

    /// Record that `node` was heard from now.
    pub fn observe(&self, node: &NodeId) {
        if self.map.lock().record(node, Instant::now()) && node != &self.node_id {
            info!(node = %self.node_id, peer = %node, "Node joined");
        }
    }

    /// Drop nodes silent for longer than the heartbeat timeout.
    pub fn sweep(&self) -> Vec<NodeId> {
        let removed = self.map.lock().sweep(Instant::now(), self.timeout);
        for peer in &removed {
            info!(node = %self.node_id, peer = %peer, "Node removed after missing heartbeats");
        }
        removed
    }

    /// How many responses a request sent now should wait for.
    #[must_use]
    pub fn expected_responses(&self) -> usize {
        self.map.lock().expected_responses(&self.node_id, self.count_self)
    }

    #[must_use]
    pub fn nodes(&self) -> Vec<NodeId> {
        self.map.lock().nodes()
    }
}

/// Publish a heartbeat every `interval` until shutdown.
///
/// The first tick fires one interval after start; the initial heartbeat is
/// sent separately when the bus starts.
pub async fn heartbeat_task(
    publisher: Arc<Publisher>,
    interval: Duration,
    error_handler: ErrorHandler,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = publisher.publish(ClusterEvent::Heartbeat).await {
                    warn!(node = %publisher.node_id(), error = %err, "Heartbeat not sent");
                    error_handler(&err);
                }
            }
            _ = shutdown.changed() => {
                debug!(node = %publisher.node_id(), "Heartbeat task stopping");
                break;
            }
        }
    }
}

/// Sweep stale nodes every `interval` until shutdown.
pub async fn sweep_task(tracker: Arc<LivenessTracker>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tracker.sweep();
            }
            _ = shutdown.changed() => {
                debug!(node = %tracker.node_id, "Sweep task stopping");
                break;
            }
        }
    }
}
