//! # Request Flows
//!
//! Scatter/gather across nodes: one response per live peer, partial results at
//! the deadline, late responses ignored, acknowledged broadcasts.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cluster_bus::{BusConfig, ClusterBusApi};
    use cluster_types::{BroadcastOptions, Packet};
    use serde_json::{json, Value};

    use crate::integration::harness::{serve, settle, socket, Cluster, Script};

    fn with_timeout(ms: u64) -> BroadcastOptions {
        let mut opts = BroadcastOptions::all();
        opts.flags.timeout_ms = Some(ms);
        opts
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_sockets_gathers_every_peer() {
        let cluster = Cluster::new();
        let a = cluster.start("a");
        let b = cluster.start("b");
        let c = cluster.start("c");
        settle().await;
        serve(
            b,
            Script {
                sockets: vec![socket("b1"), socket("b2")],
                ..Script::default()
            },
        );
        serve(
            c,
            Script {
                sockets: vec![socket("c1")],
                ..Script::default()
            },
        );

        let gathered = a.bus.fetch_sockets(BroadcastOptions::all()).await.unwrap();

        assert!(gathered.completed);
        let mut ids: Vec<_> = gathered.responses.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, ["b1", "b2", "c1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_result_when_a_peer_stays_silent() {
        let cluster = Cluster::new();
        let a = cluster.start("a");
        let b = cluster.start("b");
        let c = cluster.start("c");
        let _silent = cluster.start("d");
        settle().await;
        serve(b, Script::default());
        serve(c, Script::default());

        let started = tokio::time::Instant::now();
        let gathered = a.bus.fetch_sockets(with_timeout(200)).await.unwrap();

        assert!(!gathered.completed);
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(started.elapsed() < Duration::from_millis(250));
        assert_eq!(a.bus.pending_requests(), 0);
        assert!(a.errors.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_is_dropped_without_side_effects() {
        let cluster = Cluster::new();
        let a = cluster.start("a");
        let b = cluster.start("b");
        let c = cluster.start("c");
        let slow = cluster.start("slow");
        settle().await;
        serve(b, Script::default());
        serve(c, Script::default());
        serve(
            slow,
            Script {
                sockets: vec![socket("late")],
                delay: Duration::from_millis(500),
                ..Script::default()
            },
        );

        let first = a.bus.fetch_sockets(with_timeout(200)).await.unwrap();
        assert!(!first.completed);
        assert!(first.responses.is_empty());

        // The slow fetch answer lands while this request is pending.
        let second = a.bus.server_side_emit_with_ack(vec![json!("ping")]).await.unwrap();

        assert!(second.completed);
        let mut answers: Vec<_> = second.responses.iter().filter_map(Value::as_str).collect();
        answers.sort_unstable();
        assert_eq!(answers, ["b", "c", "slow"]);
        assert_eq!(a.bus.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_keep_their_own_responses() {
        let cluster = Cluster::new();
        let a = cluster.start("a");
        let b = cluster.start("b");
        let c = cluster.start("c");
        settle().await;
        serve(
            b,
            Script {
                sockets: vec![socket("b1")],
                delay: Duration::from_millis(30),
                ..Script::default()
            },
        );
        serve(c, Script::default());

        let fetch = a.bus.fetch_sockets(BroadcastOptions::all());
        let emit = a.bus.server_side_emit_with_ack(vec![json!("who?")]);
        let (sockets, answers) = futures::future::join(fetch, emit).await;

        let sockets = sockets.unwrap();
        assert!(sockets.completed);
        let ids: Vec<_> = sockets.responses.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["b1"]);

        let answers = answers.unwrap();
        assert!(answers.completed);
        let mut names: Vec<_> = answers.responses.iter().filter_map(Value::as_str).collect();
        names.sort_unstable();
        assert_eq!(names, ["b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_with_ack_counts_every_client() {
        let cluster = Cluster::new();
        let a = cluster.start("a");
        let b = cluster.start("b");
        let c = cluster.start("c");
        settle().await;
        serve(
            b,
            Script {
                clients: 2,
                ..Script::default()
            },
        );
        serve(
            c,
            Script {
                clients: 1,
                delay: Duration::from_millis(100),
                ..Script::default()
            },
        );

        let gathered = a
            .bus
            .broadcast_with_ack(Packet::new("/", json!(["vote?"])), BroadcastOptions::all())
            .await
            .unwrap();

        assert!(gathered.completed);
        assert_eq!(gathered.client_count, 3);
        let mut acks: Vec<_> = gathered.acks.iter().filter_map(Value::as_str).collect();
        acks.sort_unstable();
        assert_eq!(acks, ["b-0", "b-1", "c-0"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_with_ack_times_out_with_partial_acks() {
        let cluster = Cluster::new();
        let a = cluster.start("a");
        let b = cluster.start("b");
        let _silent = cluster.start("c");
        settle().await;
        serve(
            b,
            Script {
                clients: 2,
                ..Script::default()
            },
        );

        let gathered = a
            .bus
            .broadcast_with_ack(Packet::new("/", json!(["vote?"])), with_timeout(300))
            .await
            .unwrap();

        assert!(!gathered.completed);
        assert_eq!(gathered.client_count, 2);
        assert_eq!(gathered.acks.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_node_can_count_itself() {
        let cluster = Cluster::new();
        let config = BusConfig {
            count_self_in_requests: true,
            ..Cluster::config("a")
        };
        let a = cluster.start_with(config, "/");
        let b = cluster.start("b");
        settle().await;
        let a_bus = a.bus.clone();
        serve(
            a,
            Script {
                sockets: vec![socket("a1")],
                ..Script::default()
            },
        );
        serve(
            b,
            Script {
                sockets: vec![socket("b1")],
                ..Script::default()
            },
        );

        let gathered = a_bus.fetch_sockets(BroadcastOptions::all()).await.unwrap();

        assert!(gathered.completed);
        let mut ids: Vec<_> = gathered.responses.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, ["a1", "b1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lonely_node_gets_empty_completed_result() {
        let cluster = Cluster::new();
        let a = cluster.start("a");
        settle().await;

        let gathered = a.bus.server_side_emit_with_ack(vec![json!("anyone?")]).await.unwrap();

        assert!(gathered.completed);
        assert!(gathered.responses.is_empty());
    }
}
