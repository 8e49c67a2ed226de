//! # Cluster Types Crate
//!
//! Wire data model exchanged between the nodes of a cluster over the notify
//! channel.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every message kind is a variant of
//!   [`ClusterEvent`]; handlers match on it exhaustively.
//! - **Envelope Identity**: the [`Envelope`]'s `uid` is the only sender identity.
//!   Payloads never repeat it.
//! - **Transport-Safe Encoding**: envelopes are JSON text. Payloads that do not fit
//!   the channel travel as an [`AttachmentHeader`] pointing at a stored row.

pub mod entities;
pub mod envelope;
pub mod errors;
pub mod events;

pub use entities::*;
pub use envelope::{AttachmentHeader, Envelope, Frame};
pub use errors::DecodeError;
pub use events::{ClusterEvent, EventKind};
