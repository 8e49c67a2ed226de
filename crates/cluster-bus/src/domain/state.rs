use std::fmt;
use std::time::Duration;

/// Lifecycle of the listen loop.
///
/// ```text
/// Disconnected → Connecting → Listening ─(transient)→ Backoff → Connecting
///                     │            │
///                     └─(unexpected)┴──────────────→ Fatal
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Disconnected,
    Connecting,
    /// Subscription established; payloads are being delivered.
    Listening,
    /// Sleeping before the next reconnect attempt.
    Backoff { delay: Duration },
    /// Terminal. No further delivery on this node.
    Fatal,
}

impl ListenerState {
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal)
    }
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Listening => write!(f, "listening"),
            Self::Backoff { delay } => write!(f, "backoff ({}s)", delay.as_secs_f64()),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}
