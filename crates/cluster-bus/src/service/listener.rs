//! # Listener
//!
//! Keeps one subscription to the cluster channel alive and yields raw payloads.
//!
//! ```text
//! Disconnected ──▶ Connecting ──ok──▶ Listening ──stream error/end──┐
//!                   ▲     │                                         │
//!                   │  transient err                                │
//!                   │     ▼                                         │
//!                   └── Backoff{delay} ◀──────────transient─────────┘
//!
//!   any fatal error ──▶ Fatal (terminal)
//! ```
//!
//! The backoff doubles on each consecutive failure up to the cap and resets on
//! every successful subscription.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::domain::{ListenerState, ReconnectBackoff};
use crate::error::{BusError, TransportError};
use crate::ports::{ChannelSubscriber, NotificationStream};

/// Reconnecting subscription to one channel.
pub struct Listener {
    subscriber: Arc<dyn ChannelSubscriber>,
    channel: String,
    backoff: ReconnectBackoff,
    stream: Option<NotificationStream>,
    state: watch::Sender<ListenerState>,
    fatal: Option<String>,
}

impl Listener {
    pub fn new(subscriber: Arc<dyn ChannelSubscriber>, channel: String, backoff: ReconnectBackoff) -> Self {
        let (state, _) = watch::channel(ListenerState::Disconnected);
        Self {
            subscriber,
            channel,
            backoff,
            stream: None,
            state,
            fatal: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Follow state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// Next raw payload.
    ///
    /// Reconnects transparently on transient failures. Once a fatal failure was
    /// seen every call returns [`BusError::ListenerAborted`].
    pub async fn next(&mut self) -> Result<String, BusError> {
        loop {
            if let Some(reason) = &self.fatal {
                return Err(BusError::ListenerAborted(reason.clone()));
            }

            let Some(stream) = self.stream.as_mut() else {
                self.connect().await;
                continue;
            };

            match stream.next().await {
                Some(Ok(payload)) => return Ok(payload),
                Some(Err(err)) => {
                    self.stream = None;
                    self.on_failure(err).await;
                }
                None => {
                    self.stream = None;
                    self.on_failure(TransportError::Transient("subscription closed".into())).await;
                }
            }
        }
    }

    async fn connect(&mut self) {
        self.set_state(ListenerState::Connecting);
        match self.subscriber.listen(&self.channel).await {
            Ok(stream) => {
                self.backoff.reset();
                self.stream = Some(stream);
                self.set_state(ListenerState::Listening);
                info!(channel = %self.channel, "Listening");
            }
            Err(err) => self.on_failure(err).await,
        }
    }

    async fn on_failure(&mut self, err: TransportError) {
        if !err.is_transient() {
            error!(channel = %self.channel, error = %err, "Listener failed, giving up");
            self.fatal = Some(err.to_string());
            self.set_state(ListenerState::Fatal);
            return;
        }

        let delay = self.backoff.next_delay();
        warn!(
            channel = %self.channel,
            error = %err,
            delay_ms = delay.as_millis() as u64,
            "Listener disconnected, reconnecting after backoff"
        );
        self.set_state(ListenerState::Backoff { delay });
        tokio::time::sleep(delay).await;
    }

    fn set_state(&self, state: ListenerState) {
        self.state.send_replace(state);
    }
}
