//! # In-Memory Adapters
//!
//! A process-local stand-in for `pg_notify`/`LISTEN` and the attachment table.
//! Every bus sharing one [`MemoryHub`] behaves like a node connected to the
//! same database. Faults can be queued to exercise retry and reconnect paths.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cluster_types::AttachmentId;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

use crate::error::TransportError;
use crate::ports::{AttachmentStore, Backend, ChannelSubscriber, NotificationStream, NotifyTransport};

/// Payload ceiling of a Postgres notification.
pub const NOTIFY_PAYLOAD_CEILING: usize = 8000;

const HUB_CAPACITY: usize = 4096;

/// In-memory notify/listen hub.
pub struct MemoryHub {
    messages: broadcast::Sender<(String, String)>,
    breaks: broadcast::Sender<TransportError>,
    ceiling: usize,
    notify_faults: Mutex<VecDeque<TransportError>>,
    listen_faults: Mutex<VecDeque<TransportError>>,
    notified: Mutex<Vec<(String, String)>>,
    listen_attempts: Mutex<Vec<Instant>>,
}

impl MemoryHub {
    #[must_use]
    pub fn new() -> Self {
        Self::with_ceiling(NOTIFY_PAYLOAD_CEILING)
    }

    /// Hub rejecting payloads longer than `ceiling` bytes.
    #[must_use]
    pub fn with_ceiling(ceiling: usize) -> Self {
        let (messages, _) = broadcast::channel(HUB_CAPACITY);
        let (breaks, _) = broadcast::channel(16);
        Self {
            messages,
            breaks,
            ceiling,
            notify_faults: Mutex::new(VecDeque::new()),
            listen_faults: Mutex::new(VecDeque::new()),
            notified: Mutex::new(Vec::new()),
            listen_attempts: Mutex::new(Vec::new()),
        }
    }

    /// Backend whose transport and subscriber are this hub.
    #[must_use]
    pub fn backend(self: &Arc<Self>, attachments: Arc<MemoryAttachmentStore>) -> Backend {
        Backend {
            transport: self.clone(),
            subscriber: self.clone(),
            attachments,
        }
    }

    /// Fail the next notify calls with `errors`, in order.
    pub fn fail_next_notifies(&self, errors: impl IntoIterator<Item = TransportError>) {
        self.notify_faults.lock().extend(errors);
    }

    /// Fail the next listen calls with `errors`, in order.
    pub fn fail_next_listens(&self, errors: impl IntoIterator<Item = TransportError>) {
        self.listen_faults.lock().extend(errors);
    }

    /// Break every open subscription with `error`.
    pub fn break_subscriptions(&self, error: TransportError) {
        let _ = self.breaks.send(error);
    }

    /// Every successful notify as `(channel, payload)`, in call order.
    #[must_use]
    pub fn notified(&self) -> Vec<(String, String)> {
        self.notified.lock().clone()
    }

    /// Successful notifies on `channel`.
    #[must_use]
    pub fn notified_on(&self, channel: &str) -> Vec<String> {
        self.notified
            .lock()
            .iter()
            .filter(|(ch, _)| ch == channel)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// When each listen call was made.
    #[must_use]
    pub fn listen_attempts(&self) -> Vec<Instant> {
        self.listen_attempts.lock().clone()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.messages.receiver_count()
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotifyTransport for MemoryHub {
    async fn notify(&self, channel: &str, payload: &str) -> Result<(), TransportError> {
        if let Some(fault) = self.notify_faults.lock().pop_front() {
            return Err(fault);
        }
        if payload.len() > self.ceiling {
            return Err(TransportError::Fatal(format!(
                "payload string too long ({} > {})",
                payload.len(),
                self.ceiling
            )));
        }

        self.notified.lock().push((channel.to_owned(), payload.to_owned()));
        // No subscriber is fine; NOTIFY without LISTEN is a no-op.
        let _ = self.messages.send((channel.to_owned(), payload.to_owned()));
        Ok(())
    }
}

#[async_trait]
impl ChannelSubscriber for MemoryHub {
    async fn listen(&self, channel: &str) -> Result<NotificationStream, TransportError> {
        self.listen_attempts.lock().push(Instant::now());
        if let Some(fault) = self.listen_faults.lock().pop_front() {
            return Err(fault);
        }

        let receivers = (self.messages.subscribe(), self.breaks.subscribe());
        let channel = channel.to_owned();
        let stream = futures::stream::unfold(Some(receivers), move |state| {
            let channel = channel.clone();
            async move {
                let (mut messages, mut breaks) = state?;
                loop {
                    tokio::select! {
                        received = messages.recv() => match received {
                            Ok((ch, payload)) if ch == channel => {
                                return Some((Ok(payload), Some((messages, breaks))));
                            }
                            Ok(_) | Err(RecvError::Lagged(_)) => continue,
                            Err(RecvError::Closed) => return None,
                        },
                        broken = breaks.recv() => match broken {
                            Ok(error) => return Some((Err(error), None)),
                            Err(RecvError::Lagged(_)) => continue,
                            Err(RecvError::Closed) => return None,
                        },
                    }
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

/// In-memory attachment table.
#[derive(Default)]
pub struct MemoryAttachmentStore {
    rows: Mutex<BTreeMap<AttachmentId, (Vec<u8>, Instant)>>,
    next_id: AtomicI64,
    store_faults: Mutex<VecDeque<TransportError>>,
    stores: AtomicUsize,
    fetches: AtomicUsize,
}

impl MemoryAttachmentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next store calls with `errors`, in order.
    pub fn fail_next_stores(&self, errors: impl IntoIterator<Item = TransportError>) {
        self.store_faults.lock().extend(errors);
    }

    /// Delete one row, as a concurrent cleanup would.
    pub fn remove(&self, id: AttachmentId) -> bool {
        self.rows.lock().remove(&id).is_some()
    }

    #[must_use]
    pub fn get(&self, id: AttachmentId) -> Option<Vec<u8>> {
        self.rows.lock().get(&id).map(|(payload, _)| payload.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    /// Successful store calls.
    #[must_use]
    pub fn store_count(&self) -> usize {
        self.stores.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AttachmentStore for MemoryAttachmentStore {
    async fn store(&self, payload: &[u8]) -> Result<AttachmentId, TransportError> {
        if let Some(fault) = self.store_faults.lock().pop_front() {
            return Err(fault);
        }
        let id = AttachmentId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.rows.lock().insert(id, (payload.to_vec(), Instant::now()));
        self.stores.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    async fn fetch(&self, id: AttachmentId) -> Result<Option<Vec<u8>>, TransportError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self.get(id))
    }

    async fn delete_older_than(&self, age: Duration) -> Result<u64, TransportError> {
        let now = Instant::now();
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|_, (_, created_at)| now.saturating_duration_since(*created_at) <= age);
        Ok((before - rows.len()) as u64)
    }
}
