//! Pending request registries - scatter/gather correlation.
//!
//! Maps request ids to requesters waiting for responses from the cluster.
//!
//! Flow:
//! 1. Requester allocates a `RequestId` and calls `register()` with the number
//!    of responses it expects, getting a oneshot receiver
//! 2. Requester publishes the request envelope
//! 3. Inbound responses call `respond()`; the last expected one completes the receiver
//! 4. Requester calls `wait()`, which returns everything collected, complete or not

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cluster_types::{EventKind, RequestId};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Responses collected for one request.
///
/// A timeout is not an error: `completed` is `false` and `responses` holds
/// whatever arrived before the deadline, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct Gathered<T> {
    pub responses: Vec<T>,
    pub completed: bool,
}

impl<T> Gathered<T> {
    pub fn complete(responses: Vec<T>) -> Self {
        Self {
            responses,
            completed: true,
        }
    }

    pub fn partial(responses: Vec<T>) -> Self {
        Self {
            responses,
            completed: false,
        }
    }
}

/// Acknowledgements collected for one acknowledged broadcast.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AckGathered {
    pub acks: Vec<Value>,
    /// Sum of the client counts reported so far.
    pub client_count: u64,
    pub completed: bool,
}

/// What happened to a response handed to a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespondOutcome {
    /// No such request: already completed, timed out, or never ours.
    Unknown,
    /// Stored; more responses are expected.
    Collected,
    /// Stored and the request is now complete.
    Completed,
}

/// Statistics for a registry.
#[derive(Debug, Default)]
pub struct PendingStats {
    pub total_registered: AtomicU64,
    pub total_completed: AtomicU64,
    pub total_timeouts: AtomicU64,
    /// Responses that matched no pending request: late ones, and every
    /// answer to another node's request.
    pub total_unmatched: AtomicU64,
}

/// A request waiting for responses.
struct PendingRequest<T> {
    kind: EventKind,
    expected: usize,
    responses: Vec<T>,
    sender: oneshot::Sender<Vec<T>>,
    created_at: Instant,
}

/// Registry of outstanding scatter/gather requests.
pub struct PendingRegistry<T> {
    pending: Mutex<HashMap<RequestId, PendingRequest<T>>>,
    stats: PendingStats,
}

impl<T: Send> PendingRegistry<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            stats: PendingStats::default(),
        }
    }

    /// Register a request expecting `expected` responses.
    ///
    /// With `expected == 0` the receiver is completed immediately and nothing is stored.
    pub fn register(
        &self,
        request_id: RequestId,
        kind: EventKind,
        expected: usize,
    ) -> oneshot::Receiver<Vec<T>> {
        let (tx, rx) = oneshot::channel();
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        if expected == 0 {
            let _ = tx.send(Vec::new());
            self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
            return rx;
        }

        self.pending.lock().insert(
            request_id,
            PendingRequest {
                kind,
                expected,
                responses: Vec::with_capacity(expected),
                sender: tx,
                created_at: Instant::now(),
            },
        );

        debug!(
            request_id = %request_id,
            kind = %kind,
            expected = expected,
            "Registered pending request"
        );
        rx
    }

    /// Hand a response to the request it answers.
    pub fn respond(&self, request_id: RequestId, response: T) -> RespondOutcome {
        let mut pending = self.pending.lock();

        let Some(request) = pending.get_mut(&request_id) else {
            self.stats.total_unmatched.fetch_add(1, Ordering::Relaxed);
            debug!(request_id = %request_id, "Response for unknown or expired request dropped");
            return RespondOutcome::Unknown;
        };

        request.responses.push(response);
        if request.responses.len() < request.expected {
            return RespondOutcome::Collected;
        }

        let Some(request) = pending.remove(&request_id) else {
            return RespondOutcome::Unknown;
        };
        drop(pending);

        self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
        debug!(
            request_id = %request_id,
            kind = %request.kind,
            elapsed_ms = request.created_at.elapsed().as_millis(),
            "Completed pending request"
        );
        // A dropped receiver means the requester gave up; nothing left to do.
        let _ = request.sender.send(request.responses);
        RespondOutcome::Completed
    }

    /// Remove a request, returning what it collected. `None` if it already completed.
    pub fn expire(&self, request_id: RequestId) -> Option<Vec<T>> {
        let request = self.pending.lock().remove(&request_id)?;
        self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
        warn!(
            request_id = %request_id,
            kind = %request.kind,
            received = request.responses.len(),
            expected = request.expected,
            "Request timed out with partial responses"
        );
        Some(request.responses)
    }

    /// Wait for completion or `timeout`, whichever comes first.
    pub async fn wait(
        &self,
        request_id: RequestId,
        mut receiver: oneshot::Receiver<Vec<T>>,
        timeout: Duration,
    ) -> Gathered<T> {
        if let Ok(Ok(responses)) = tokio::time::timeout(timeout, &mut receiver).await {
            return Gathered::complete(responses);
        }

        match self.expire(request_id) {
            Some(partial) => Gathered::partial(partial),
            // Completed between the deadline and the removal.
            None => match receiver.try_recv() {
                Ok(responses) => Gathered::complete(responses),
                Err(_) => Gathered::partial(Vec::new()),
            },
        }
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    #[must_use]
    pub fn is_pending(&self, request_id: &RequestId) -> bool {
        self.pending.lock().contains_key(request_id)
    }

    #[must_use]
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

impl<T: Send> Default for PendingRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// An acknowledged broadcast waiting for client counts and acks.
struct PendingAck {
    nodes_expected: usize,
    nodes_reported: usize,
    client_count: u64,
    acks: Vec<Value>,
    sender: oneshot::Sender<(Vec<Value>, u64)>,
}

impl PendingAck {
    fn is_complete(&self) -> bool {
        self.nodes_reported >= self.nodes_expected && self.acks.len() as u64 >= self.client_count
    }
}

/// Registry of outstanding acknowledged broadcasts.
///
/// Same shape as [`PendingRegistry`], except the number of expected acks is only
/// known once every node has reported its client count. Counts and acks may
/// arrive in any order.
pub struct AckRegistry {
    pending: Mutex<HashMap<RequestId, PendingAck>>,
    stats: PendingStats,
}

impl AckRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            stats: PendingStats::default(),
        }
    }

    pub fn register(
        &self,
        request_id: RequestId,
        nodes_expected: usize,
    ) -> oneshot::Receiver<(Vec<Value>, u64)> {
        let (tx, rx) = oneshot::channel();
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        if nodes_expected == 0 {
            let _ = tx.send((Vec::new(), 0));
            self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
            return rx;
        }

        self.pending.lock().insert(
            request_id,
            PendingAck {
                nodes_expected,
                nodes_reported: 0,
                client_count: 0,
                acks: Vec::new(),
                sender: tx,
            },
        );
        debug!(request_id = %request_id, nodes = nodes_expected, "Registered pending ack");
        rx
    }

    /// Record one node's client count.
    pub fn report_count(&self, request_id: RequestId, client_count: u64) -> RespondOutcome {
        self.update(request_id, |ack| {
            ack.nodes_reported += 1;
            ack.client_count += client_count;
        })
    }

    /// Record one client acknowledgement.
    pub fn ack(&self, request_id: RequestId, packet: Value) -> RespondOutcome {
        self.update(request_id, |ack| ack.acks.push(packet))
    }

    fn update(&self, request_id: RequestId, apply: impl FnOnce(&mut PendingAck)) -> RespondOutcome {
        let mut pending = self.pending.lock();

        let Some(ack) = pending.get_mut(&request_id) else {
            self.stats.total_unmatched.fetch_add(1, Ordering::Relaxed);
            debug!(request_id = %request_id, "Ack for unknown or expired broadcast dropped");
            return RespondOutcome::Unknown;
        };

        apply(ack);
        if !ack.is_complete() {
            return RespondOutcome::Collected;
        }

        let Some(ack) = pending.remove(&request_id) else {
            return RespondOutcome::Unknown;
        };
        drop(pending);

        self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
        let _ = ack.sender.send((ack.acks, ack.client_count));
        RespondOutcome::Completed
    }

    pub fn expire(&self, request_id: RequestId) -> Option<(Vec<Value>, u64)> {
        let ack = self.pending.lock().remove(&request_id)?;
        self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
        warn!(
            request_id = %request_id,
            nodes_reported = ack.nodes_reported,
            nodes_expected = ack.nodes_expected,
            acks = ack.acks.len(),
            clients = ack.client_count,
            "Acknowledged broadcast timed out"
        );
        Some((ack.acks, ack.client_count))
    }

    pub async fn wait(
        &self,
        request_id: RequestId,
        mut receiver: oneshot::Receiver<(Vec<Value>, u64)>,
        timeout: Duration,
    ) -> AckGathered {
        if let Ok(Ok((acks, client_count))) = tokio::time::timeout(timeout, &mut receiver).await {
            return AckGathered {
                acks,
                client_count,
                completed: true,
            };
        }

        let (acks, client_count, completed) = match self.expire(request_id) {
            Some((acks, count)) => (acks, count, false),
            None => match receiver.try_recv() {
                Ok((acks, count)) => (acks, count, true),
                Err(_) => (Vec::new(), 0, false),
            },
        };
        AckGathered {
            acks,
            client_count,
            completed,
        }
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    #[must_use]
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

impl Default for AckRegistry {
    fn default() -> Self {
        Self::new()
    }
}
