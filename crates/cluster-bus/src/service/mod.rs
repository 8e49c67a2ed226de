//! # Service Layer
//!
//! Components wired together by [`ClusterBus`]:
//!
//! - [`Publisher`]: encode, offload, notify with bounded retry
//! - [`Listener`]: reconnecting subscription state machine
//! - [`LivenessTracker`]: last-seen map, heartbeat and sweep tasks
//! - [`RequestCoordinator`]: scatter/gather and acknowledged broadcasts
//! - [`cleanup_task`]: periodic attachment deletion

mod bus;
mod cleanup;
mod coordinator;
mod listener;
mod liveness;
mod publisher;

pub use bus::{ClusterBus, InboundEvent, InboundStream};
pub use cleanup::cleanup_task;
pub use coordinator::{RequestCoordinator, Response};
pub use listener::Listener;
pub use liveness::{heartbeat_task, sweep_task, LivenessTracker};
pub use publisher::{PublishOutcome, Publisher};
