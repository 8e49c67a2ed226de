//! # Bus Node
//!
//! Joins the cluster on every configured namespace and stays there until
//! Ctrl+C.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from `PGBUS_*` environment variables
//! 2. Validate the bus configuration
//! 3. Connect the Postgres pool and ensure the attachment table
//! 4. Start one bus per namespace and serve its inbound events
//! 5. On Ctrl+C, close every bus
//!
//! If any namespace stops receiving before Ctrl+C (fatal listener failure),
//! every bus is closed and the process exits with an error.

mod responder;
mod settings;

use std::sync::Arc;

use anyhow::{Context, Result};
use cluster_bus::{pg_backend, ClusterBus, ClusterBusApi, PgAttachmentStore};
use sqlx::postgres::PgPoolOptions;
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::settings::load_config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = load_config();
    settings.bus.validate().context("invalid bus configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await
        .context("cannot connect to Postgres")?;

    let attachments = Arc::new(PgAttachmentStore::new(pool.clone(), &settings.bus.table_name)?);
    attachments
        .ensure_table()
        .await
        .context("cannot create attachment table")?;
    let backend = pg_backend(pool.clone(), attachments);

    let mut buses = Vec::with_capacity(settings.namespaces.len());
    let mut servers = JoinSet::new();
    for namespace in &settings.namespaces {
        let (bus, events) = ClusterBus::start(settings.bus.clone(), namespace, backend.clone())
            .with_context(|| format!("cannot start bus for namespace {namespace}"))?;
        let bus = Arc::new(bus);
        info!(namespace = %namespace, node = %bus.node_id(), channel = %bus.channel(), "Joined cluster");
        servers.spawn(responder::serve(bus.clone(), events));
        buses.push(bus);
    }

    info!("Node is running. Press Ctrl+C to stop.");
    let outcome = responder::supervise(&buses, servers, tokio::signal::ctrl_c()).await;

    pool.close().await;
    info!("Shutdown complete");
    outcome
}
