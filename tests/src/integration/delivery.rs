//! # Delivery Flows
//!
//! Envelopes within the threshold travel inline in exactly one notification;
//! larger or binary ones travel through the attachment table and arrive
//! byte-identical on every other node.

#[cfg(test)]
mod tests {
    use cluster_bus::{BusConfig, ClusterBusApi, ListenerState, NotifyTransport, PublishOutcome};
    use cluster_types::{
        AttachmentHeader, AttachmentId, BroadcastOptions, ClusterEvent, Envelope, EventKind, Frame, NodeId, Packet,
    };
    use serde_json::json;

    use crate::integration::harness::{settle, Cluster, CHANNEL};

    fn broadcast_event(packet: Packet) -> ClusterEvent {
        ClusterEvent::Broadcast {
            packet,
            opts: BroadcastOptions::all(),
            request_id: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_small_broadcast_is_one_exact_notification() {
        let cluster = Cluster::new();
        let a = cluster.start("a");
        let mut b = cluster.start("b");
        settle().await;

        let packet = Packet::new("/", json!(["chat", {"text": "hello"}]));
        let expected = Envelope::new(a.id(), broadcast_event(packet.clone())).encode().unwrap();
        let outcome = a.bus.broadcast(packet.clone(), BroadcastOptions::all()).await.unwrap();
        settle().await;

        assert_eq!(outcome, PublishOutcome::Sent);
        let matching: Vec<_> = cluster
            .hub
            .notified_on(CHANNEL)
            .into_iter()
            .filter(|payload| payload.contains("\"broadcast\""))
            .collect();
        assert_eq!(matching, vec![expected]);
        assert_eq!(cluster.store.store_count(), 0);

        let received = b.events.recv().await.unwrap();
        assert_eq!(received.sender, a.id());
        assert_eq!(received.event, broadcast_event(packet));
    }

    #[tokio::test(start_paused = true)]
    async fn test_large_broadcast_travels_as_attachment() {
        let cluster = Cluster::new();
        let a = cluster.start("a");
        let mut b = cluster.start("b");
        let mut c = cluster.start("c");
        settle().await;

        let packet = Packet::new("/", json!(["blob", "x".repeat(20_000)]));
        let expected = Envelope::new(a.id(), broadcast_event(packet.clone())).encode().unwrap();
        let outcome = a.bus.broadcast(packet.clone(), BroadcastOptions::all()).await.unwrap();
        settle().await;

        let PublishOutcome::Attached(id) = outcome else {
            panic!("expected an attachment, got {outcome:?}");
        };
        assert_eq!(cluster.store.get(id), Some(expected.into_bytes()));

        let header = cluster
            .hub
            .notified_on(CHANNEL)
            .into_iter()
            .find_map(|payload| match Frame::decode(&payload) {
                Ok(Frame::Attachment(header)) => Some(header),
                _ => None,
            })
            .unwrap();
        assert_eq!(header, AttachmentHeader::new(a.id(), EventKind::Broadcast, id));

        // Every peer reads the same row.
        for node in [&mut b, &mut c] {
            let received = node.events.recv().await.unwrap();
            assert_eq!(received.event, broadcast_event(packet.clone()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_binary_packet_arrives_intact() {
        let cluster = Cluster::new();
        let a = cluster.start("a");
        let mut b = cluster.start("b");
        settle().await;

        let packet = Packet::new("/", json!(["upload"])).with_binary(vec![0, 255, 7, 128]);
        let outcome = a.bus.broadcast(packet.clone(), BroadcastOptions::all()).await.unwrap();
        settle().await;

        assert!(matches!(outcome, PublishOutcome::Attached(_)));
        let received = b.events.recv().await.unwrap();
        let ClusterEvent::Broadcast { packet: delivered, .. } = received.event else {
            panic!("expected a broadcast");
        };
        assert_eq!(delivered.binary, vec![vec![0, 255, 7, 128]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_attachment_is_reported_not_fatal() {
        let cluster = Cluster::new();
        let mut b = cluster.start("b");
        settle().await;

        let header = AttachmentHeader::new(NodeId::new("ghost"), EventKind::Broadcast, AttachmentId::new(999));
        cluster.hub.notify(CHANNEL, &header.encode().unwrap()).await.unwrap();
        settle().await;

        assert_eq!(*b.errors.lock(), vec!["Attachment 999 not found".to_string()]);
        assert_eq!(b.bus.listener_state(), ListenerState::Listening);

        // The node keeps receiving afterwards.
        let a = cluster.start("a");
        settle().await;
        a.bus.server_side_emit(vec![json!("still there?")]).await.unwrap();
        settle().await;
        let received = b.events.recv().await.unwrap();
        assert_eq!(received.event.kind(), EventKind::ServerSideEmit);
    }

    #[tokio::test(start_paused = true)]
    async fn test_namespaces_are_isolated() {
        let cluster = Cluster::new();
        let a = cluster.start("a");
        let mut b_root = cluster.start("b");
        let mut b_admin = cluster.start_with(Cluster::config("b"), "/admin");
        settle().await;

        a.bus.add_sockets(BroadcastOptions::all().to_room("lobby"), vec!["game-1".to_string()])
            .await
            .unwrap();
        settle().await;

        let received = b_root.events.recv().await.unwrap();
        assert_eq!(
            received.event,
            ClusterEvent::SocketsJoin {
                opts: BroadcastOptions::all().to_room("lobby"),
                rooms: vec!["game-1".to_string()],
            }
        );
        assert_eq!(b_admin.bus.channel(), "socket.io#/admin");
        assert!(b_admin.bus.known_nodes().iter().all(|node| node.as_str() == "b"));

        b_admin.bus.close().await;
        assert!(b_admin.events.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_threshold_applies_per_node() {
        let cluster = Cluster::new();
        let config = BusConfig {
            payload_threshold: 64,
            ..Cluster::config("a")
        };
        let a = cluster.start_with(config, "/");
        let mut b = cluster.start("b");
        settle().await;

        let outcome = a.bus.server_side_emit(vec![json!("a message well past sixty-four bytes once wrapped")]).await.unwrap();
        settle().await;

        assert!(matches!(outcome, PublishOutcome::Attached(_)));
        assert_eq!(b.events.recv().await.unwrap().event.kind(), EventKind::ServerSideEmit);
    }
}
