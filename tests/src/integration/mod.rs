//! Cross-node flows over [`cluster_bus::MemoryHub`]. Every test runs with a
//! paused clock, so heartbeats, backoff and timeouts are deterministic.

#[cfg(test)]
mod harness;

pub mod delivery;
pub mod membership;
pub mod requests;
