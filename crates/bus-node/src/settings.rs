//! Node settings loaded from `PGBUS_*` environment variables.

use std::time::Duration;

use cluster_bus::BusConfig;
use cluster_types::NodeId;
use tracing::{info, warn};

const DEFAULT_DATABASE_URL: &str = "postgres://postgres@localhost/postgres";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Everything the node needs to start.
#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub database_url: String,
    pub max_connections: u32,
    /// One bus is started per namespace.
    pub namespaces: Vec<String>,
    pub bus: BusConfig,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            namespaces: vec!["/".to_string()],
            bus: BusConfig::default(),
        }
    }
}

/// Load settings from the process environment.
pub fn load_config() -> NodeSettings {
    load_config_from(|key| std::env::var(key).ok())
}

/// Load settings from `lookup`, falling back to defaults for unset or invalid values.
pub fn load_config_from(lookup: impl Fn(&str) -> Option<String>) -> NodeSettings {
    let mut settings = NodeSettings::default();

    match lookup("PGBUS_DATABASE_URL") {
        Some(url) => settings.database_url = url,
        None => warn!("PGBUS_DATABASE_URL not set, using {}", DEFAULT_DATABASE_URL),
    }
    if let Some(n) = parse(&lookup, "PGBUS_MAX_CONNECTIONS") {
        settings.max_connections = n;
    }
    if let Some(namespaces) = lookup("PGBUS_NAMESPACES") {
        let namespaces: Vec<String> = namespaces
            .split(',')
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .map(String::from)
            .collect();
        if namespaces.is_empty() {
            warn!("PGBUS_NAMESPACES is empty, keeping \"/\"");
        } else {
            settings.namespaces = namespaces;
        }
    }

    let bus = &mut settings.bus;
    if let Some(uid) = lookup("PGBUS_UID") {
        bus.uid = Some(NodeId::new(uid));
    }
    if let Some(prefix) = lookup("PGBUS_CHANNEL_PREFIX") {
        bus.channel_prefix = prefix;
    }
    if let Some(table) = lookup("PGBUS_TABLE_NAME") {
        bus.table_name = table;
    }
    if let Some(bytes) = parse(&lookup, "PGBUS_PAYLOAD_THRESHOLD") {
        bus.payload_threshold = bytes;
    }
    if let Some(ms) = parse(&lookup, "PGBUS_REQUESTS_TIMEOUT_MS") {
        bus.requests_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = parse(&lookup, "PGBUS_HEARTBEAT_INTERVAL_MS") {
        bus.heartbeat_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = parse(&lookup, "PGBUS_HEARTBEAT_TIMEOUT_MS") {
        bus.heartbeat_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = parse(&lookup, "PGBUS_CLEANUP_INTERVAL_MS") {
        bus.cleanup_interval = Duration::from_millis(ms);
    }

    info!(namespaces = ?settings.namespaces, "Configuration loaded");
    settings
}

fn parse<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("{} has invalid value {:?}, using default", key, raw);
            None
        }
    }
}
