//! # Membership Flows
//!
//! Nodes learn each other through the initial heartbeat handshake, keep each
//! other alive with periodic heartbeats, and drop a peer once it has been
//! silent for longer than `heartbeat_timeout`.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cluster_bus::ClusterBusApi;
    use cluster_types::NodeId;

    use crate::integration::harness::{settle, Cluster};

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|name| NodeId::new(*name)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_newcomer_learns_existing_nodes_immediately() {
        let cluster = Cluster::new();
        let a = cluster.start("a");
        let b = cluster.start("b");
        settle().await;

        let c = cluster.start("c");
        settle().await;

        for node in [&a, &b, &c] {
            assert_eq!(node.bus.known_nodes(), ids(&["a", "b", "c"]));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_keep_peers_alive() {
        let cluster = Cluster::new();
        let a = cluster.start("a");
        let b = cluster.start("b");
        settle().await;

        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(a.bus.known_nodes(), ids(&["a", "b"]));
        assert_eq!(b.bus.known_nodes(), ids(&["a", "b"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_is_removed_then_reinstated() {
        let cluster = Cluster::new();
        let a = cluster.start("a");
        let b = cluster.start("b");
        settle().await;
        assert_eq!(a.bus.known_nodes(), ids(&["a", "b"]));

        b.bus.close().await;

        // Last heard at ~0s, so the 5s sweep keeps it.
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(a.bus.known_nodes(), ids(&["a", "b"]));

        // Gone once a sweep sees it silent for more than 10s.
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(a.bus.known_nodes(), ids(&["a"]));

        let _b = cluster.start("b");
        settle().await;
        assert_eq!(a.bus.known_nodes(), ids(&["a", "b"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_own_heartbeats_are_recorded() {
        let cluster = Cluster::new();
        let a = cluster.start("a");
        settle().await;

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(a.bus.known_nodes(), ids(&["a"]));
    }
}
