//! # Cluster Bus Benchmarks
//!
//! Hot paths on every notification:
//!
//! | Path | Runs |
//! |------|------|
//! | Envelope encode | once per publish |
//! | Frame decode | once per notification, on every node |
//! | Pending registry | once per response |
//! | Liveness map | once per notification, plus every sweep |

use std::time::Duration;

use cluster_bus::domain::{LivenessMap, PendingRegistry};
use cluster_types::{
    AttachmentHeader, AttachmentId, BroadcastOptions, ClusterEvent, Envelope, EventKind, Frame, NodeId, Packet,
    RequestId,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use tokio::time::Instant;

fn broadcast(text_len: usize) -> ClusterEvent {
    ClusterEvent::Broadcast {
        packet: Packet::new("/", json!(["chat", {"text": "x".repeat(text_len)}])),
        opts: BroadcastOptions::all().to_room("lobby").except_room("muted"),
        request_id: None,
    }
}

fn bench_envelope_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope-encode");
    let node = NodeId::new("node-a");

    for size in [64, 1_024, 7_000] {
        let envelope = Envelope::new(node.clone(), broadcast(size));
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("broadcast", size), &envelope, |b, envelope| {
            b.iter(|| black_box(envelope.encode()))
        });
    }
    group.finish();
}

fn bench_frame_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame-decode");
    let node = NodeId::new("node-a");

    let inline = Envelope::new(node.clone(), broadcast(1_024)).encode().unwrap_or_default();
    group.bench_function("inline_broadcast", |b| b.iter(|| black_box(Frame::decode(&inline))));

    let heartbeat = Envelope::new(node.clone(), ClusterEvent::Heartbeat).encode().unwrap_or_default();
    group.bench_function("heartbeat", |b| b.iter(|| black_box(Frame::decode(&heartbeat))));

    let header = AttachmentHeader::new(node, EventKind::Broadcast, AttachmentId::new(42))
        .encode()
        .unwrap_or_default();
    group.bench_function("attachment_header", |b| b.iter(|| black_box(Frame::decode(&header))));

    group.finish();
}

fn bench_pending_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("pending-registry");

    for peers in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(peers as u64));
        group.bench_with_input(BenchmarkId::new("register_and_complete", peers), &peers, |b, &peers| {
            let registry: PendingRegistry<u64> = PendingRegistry::new();
            b.iter(|| {
                let request_id = RequestId::new();
                let receiver = registry.register(request_id, EventKind::FetchSockets, peers);
                for response in 0..peers as u64 {
                    black_box(registry.respond(request_id, response));
                }
                black_box(receiver)
            })
        });
    }

    group.bench_function("unmatched_response", |b| {
        let registry: PendingRegistry<u64> = PendingRegistry::new();
        b.iter(|| black_box(registry.respond(RequestId::new(), 1)))
    });

    group.finish();
}

fn bench_liveness_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("liveness-map");
    let nodes: Vec<NodeId> = (0..100).map(|i| NodeId::new(format!("node-{i}"))).collect();

    group.bench_function("record_100_nodes", |b| {
        let mut map = LivenessMap::new();
        b.iter(|| {
            let now = Instant::now();
            for node in &nodes {
                black_box(map.record(node, now));
            }
        })
    });

    group.bench_function("sweep_100_nodes", |b| {
        let mut map = LivenessMap::new();
        let now = Instant::now();
        for node in &nodes {
            map.record(node, now);
        }
        b.iter(|| black_box(map.sweep(Instant::now(), Duration::from_secs(10))))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_envelope_encode,
    bench_frame_decode,
    bench_pending_registry,
    bench_liveness_map
);

criterion_main!(benches);
