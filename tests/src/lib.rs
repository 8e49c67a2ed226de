//! # Cluster Bus Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/      # Several nodes on one in-memory hub
//!     ├── harness.rs    # Cluster fixture and scripted responders
//!     ├── delivery.rs   # Inline vs attachment publishing, namespaces
//!     ├── membership.rs # Heartbeats, pruning, reinstatement
//!     ├── requests.rs   # Scatter/gather, timeouts, acknowledged broadcasts
//!     └── reconnect.rs  # Listener backoff and fatal failure
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p bus-tests
//! cargo test -p bus-tests integration::requests::
//!
//! # Benchmarks
//! cargo bench -p bus-tests
//! ```

pub mod integration;
