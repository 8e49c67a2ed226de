//! # Adapters
//!
//! Implementations of the outbound ports.
//!
//! - `postgres`: `pg_notify`, `LISTEN` and an attachment table through `sqlx`.
//! - `memory`: in-process hub and store with fault injection, for tests.

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;
