//! # Ports
//!
//! - **Outbound (driven)**: what the bus requires from its environment: a
//!   notify primitive, a channel subscription and an attachment store.
//! - **Inbound (driving)**: the API the owning messaging layer calls.

pub mod inbound;
pub mod outbound;

pub use inbound::ClusterBusApi;
pub use outbound::{AttachmentStore, Backend, ChannelSubscriber, NotificationStream, NotifyTransport};
