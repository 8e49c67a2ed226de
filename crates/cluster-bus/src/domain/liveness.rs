//! # Liveness Map
//!
//! Last time each node was heard from. The map is the membership view: its
//! size, minus this node, is how many responses a scatter/gather request waits for.

use std::collections::HashMap;
use std::time::Duration;

use cluster_types::NodeId;
use tokio::time::Instant;

/// NodeId → last-seen instant.
#[derive(Debug, Default)]
pub struct LivenessMap {
    nodes: HashMap<NodeId, Instant>,
}

impl LivenessMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `node` was heard from at `now`.
    ///
    /// Returns `true` when the node was not in the map. Timestamps never move
    /// backwards, so a late-arriving older observation is ignored.
    pub fn record(&mut self, node: &NodeId, now: Instant) -> bool {
        match self.nodes.get_mut(node) {
            Some(last_seen) => {
                if now > *last_seen {
                    *last_seen = now;
                }
                false
            }
            None => {
                self.nodes.insert(node.clone(), now);
                true
            }
        }
    }

    /// Remove every node silent for longer than `timeout`. Returns the removed ids.
    pub fn sweep(&mut self, now: Instant, timeout: Duration) -> Vec<NodeId> {
        let mut removed = Vec::new();
        self.nodes.retain(|node, last_seen| {
            let alive = now.saturating_duration_since(*last_seen) <= timeout;
            if !alive {
                removed.push(node.clone());
            }
            alive
        });
        removed.sort();
        removed
    }

    /// Number of responses to expect from the cluster for a request sent by `own`.
    #[must_use]
    pub fn expected_responses(&self, own: &NodeId, count_self: bool) -> usize {
        if !count_self && self.nodes.contains_key(own) {
            self.nodes.len() - 1
        } else if count_self && !self.nodes.contains_key(own) {
            self.nodes.len() + 1
        } else {
            self.nodes.len()
        }
    }

    #[must_use]
    pub fn contains(&self, node: &NodeId) -> bool {
        self.nodes.contains_key(node)
    }

    /// Known nodes, sorted for stable output.
    #[must_use]
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.nodes.keys().cloned().collect();
        nodes.sort();
        nodes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
