//! # Cluster Bus - Node Coordination over Postgres NOTIFY
//!
//! Lets independent server processes act as one cluster by exchanging
//! envelopes on a `LISTEN`/`NOTIFY` channel instead of direct connections.
//!
//! ## Architecture
//!
//! ```text
//!   owning layer ──publish()──▶ ┌──────────────┐ ──▶ Publisher ──▶ notify
//!                               │  ClusterBus  │          └──▶ AttachmentStore
//!   owning layer ◀─InboundStream│   (façade)   │ ◀── Listener ◀── listen
//!                               └──────┬───────┘
//!                         ┌────────────┴────────────┐
//!                         ▼                         ▼
//!                  LivenessTracker          RequestCoordinator
//!               (heartbeats, sweep)      (scatter/gather, acks)
//! ```
//!
//! ## Delivery model
//!
//! - At-most-once and unordered. Nothing here assumes two notifies arrive in order.
//! - Envelopes above `payload_threshold`, or carrying binary data, travel as a
//!   small header referencing an attachment row.
//! - Scatter/gather requests always end at their deadline; a timeout is a
//!   partial result, not an error.
//! - A fatal listener failure stops inbound delivery for good. The owning
//!   process is expected to restart.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![deny(unsafe_code)]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use config::{BusConfig, ConfigError, ErrorHandler};
pub use domain::{AckGathered, Gathered, ListenerState};
pub use error::{BusError, TransportError};
pub use ports::{AttachmentStore, Backend, ChannelSubscriber, ClusterBusApi, NotificationStream, NotifyTransport};
pub use service::{ClusterBus, InboundEvent, InboundStream, PublishOutcome};

#[cfg(feature = "postgres")]
pub use adapters::postgres::{pg_backend, PgAttachmentStore, PgChannelSubscriber, PgNotifier};

#[cfg(any(test, feature = "test-utils"))]
pub use adapters::memory::{MemoryAttachmentStore, MemoryHub};
