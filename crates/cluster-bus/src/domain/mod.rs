//! # Domain Layer
//!
//! Pure coordination state: who is alive, which requests are waiting for
//! responses, and how long the listener waits before reconnecting.

pub mod backoff;
pub mod liveness;
pub mod pending;
pub mod state;

pub use backoff::ReconnectBackoff;
pub use liveness::LivenessMap;
pub use pending::{AckGathered, AckRegistry, Gathered, PendingRegistry, PendingStats, RespondOutcome};
pub use state::ListenerState;
