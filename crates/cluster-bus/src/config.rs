//! # Bus Configuration
//!
//! Every option has a default matching what the other nodes of a cluster
//! expect, so a node started with `BusConfig::default()` joins a cluster of
//! default-configured peers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cluster_types::NodeId;
use thiserror::Error;
use tracing::error;

use crate::error::BusError;

/// Callback receiving every error the bus does not return to a caller.
pub type ErrorHandler = Arc<dyn Fn(&BusError) + Send + Sync>;

/// Longest identifier Postgres accepts without truncation.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("payload_threshold must be greater than zero")]
    ZeroPayloadThreshold,

    #[error("heartbeat_timeout ({timeout:?}) must exceed heartbeat_interval ({interval:?})")]
    HeartbeatTimeoutTooShort { interval: Duration, timeout: Duration },

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("publish_attempts must be at least 1")]
    ZeroPublishAttempts,

    #[error("listen_backoff_max ({max:?}) is below listen_backoff_initial ({initial:?})")]
    BackoffCapBelowInitial { initial: Duration, max: Duration },

    #[error("table_name {0:?} is not a valid SQL identifier")]
    InvalidTableName(String),

    #[error("inbound_capacity must be greater than zero")]
    ZeroInboundCapacity,
}

/// Complete bus configuration.
#[derive(Clone)]
pub struct BusConfig {
    /// Identity of this node. A random id is generated when unset.
    pub uid: Option<NodeId>,
    /// Prefix of the notify channel; the namespace is appended after `#`.
    pub channel_prefix: String,
    /// Table holding oversized or binary payloads.
    pub table_name: String,
    /// Largest serialized envelope sent inline, in bytes.
    pub payload_threshold: usize,
    /// Deadline for scatter/gather requests.
    pub requests_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// Age after which a silent node is removed from the membership view.
    pub heartbeat_timeout: Duration,
    /// Attachments older than this are deleted; also the cleanup period.
    pub cleanup_interval: Duration,
    /// Total publish attempts on transient failures.
    pub publish_attempts: u32,
    /// First listen reconnect delay; doubled on each consecutive failure.
    pub listen_backoff_initial: Duration,
    pub listen_backoff_max: Duration,
    /// Whether this node counts toward the expected responses of its own requests.
    pub count_self_in_requests: bool,
    /// Buffered inbound events before the owning layer is considered lagging.
    pub inbound_capacity: usize,
    pub error_handler: ErrorHandler,
}

impl BusConfig {
    /// Notify channel used for `namespace`.
    #[must_use]
    pub fn channel_for(&self, namespace: &str) -> String {
        format!("{}#{}", self.channel_prefix, namespace)
    }

    /// Validate the configuration before a bus is started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.payload_threshold == 0 {
            return Err(ConfigError::ZeroPayloadThreshold);
        }
        for (name, value) in [
            ("requests_timeout", self.requests_timeout),
            ("heartbeat_interval", self.heartbeat_interval),
            ("cleanup_interval", self.cleanup_interval),
            ("listen_backoff_initial", self.listen_backoff_initial),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration(name));
            }
        }
        if self.heartbeat_timeout <= self.heartbeat_interval {
            return Err(ConfigError::HeartbeatTimeoutTooShort {
                interval: self.heartbeat_interval,
                timeout: self.heartbeat_timeout,
            });
        }
        if self.publish_attempts == 0 {
            return Err(ConfigError::ZeroPublishAttempts);
        }
        if self.listen_backoff_max < self.listen_backoff_initial {
            return Err(ConfigError::BackoffCapBelowInitial {
                initial: self.listen_backoff_initial,
                max: self.listen_backoff_max,
            });
        }
        if !is_sql_identifier(&self.table_name) {
            return Err(ConfigError::InvalidTableName(self.table_name.clone()));
        }
        if self.inbound_capacity == 0 {
            return Err(ConfigError::ZeroInboundCapacity);
        }
        Ok(())
    }

    /// Replace the error handler.
    #[must_use]
    pub fn with_error_handler(mut self, handler: impl Fn(&BusError) + Send + Sync + 'static) -> Self {
        self.error_handler = Arc::new(handler);
        self
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            uid: None,
            channel_prefix: "socket.io".to_string(),
            table_name: "socket_io_attachments".to_string(),
            payload_threshold: 8000,
            requests_timeout: Duration::from_millis(5000),
            heartbeat_interval: Duration::from_millis(5000),
            heartbeat_timeout: Duration::from_millis(10000),
            cleanup_interval: Duration::from_millis(30000),
            publish_attempts: 2,
            listen_backoff_initial: Duration::from_secs(1),
            listen_backoff_max: Duration::from_secs(60),
            count_self_in_requests: false,
            inbound_capacity: 1000,
            error_handler: Arc::new(default_error_handler),
        }
    }
}

impl fmt::Debug for BusConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusConfig")
            .field("uid", &self.uid)
            .field("channel_prefix", &self.channel_prefix)
            .field("table_name", &self.table_name)
            .field("payload_threshold", &self.payload_threshold)
            .field("requests_timeout", &self.requests_timeout)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("heartbeat_timeout", &self.heartbeat_timeout)
            .field("cleanup_interval", &self.cleanup_interval)
            .field("publish_attempts", &self.publish_attempts)
            .field("listen_backoff_initial", &self.listen_backoff_initial)
            .field("listen_backoff_max", &self.listen_backoff_max)
            .field("count_self_in_requests", &self.count_self_in_requests)
            .field("inbound_capacity", &self.inbound_capacity)
            .finish_non_exhaustive()
    }
}

fn default_error_handler(err: &BusError) {
    error!(error = %err, "Cluster bus error");
}

/// Letters, digits and underscores, optionally schema-qualified with one dot.
pub(crate) fn is_sql_identifier(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() <= 2
        && parts.iter().all(|part| {
            !part.is_empty()
                && part.len() <= MAX_IDENTIFIER_LEN
                && !part.starts_with(|c: char| c.is_ascii_digit())
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}
