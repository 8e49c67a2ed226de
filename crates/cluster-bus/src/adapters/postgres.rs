//! # Postgres Adapters
//!
//! - [`PgNotifier`]: `SELECT pg_notify($1, $2)` on a pooled connection.
//! - [`PgChannelSubscriber`]: a dedicated `LISTEN` connection per subscription.
//!   A lost connection ends the stream with a transient error; reconnecting is
//!   left to the listener's backoff.
//! - [`PgAttachmentStore`]: `bytea` rows keyed by a `bigserial` id.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cluster_types::AttachmentId;
use sqlx::postgres::{PgListener, PgPool};
use tracing::{debug, info};

use crate::config::{is_sql_identifier, ConfigError};
use crate::error::TransportError;
use crate::ports::{AttachmentStore, Backend, ChannelSubscriber, NotificationStream, NotifyTransport};

/// Backend running every port on `pool`.
#[must_use]
pub fn pg_backend(pool: PgPool, attachments: Arc<PgAttachmentStore>) -> Backend {
    Backend {
        transport: Arc::new(PgNotifier::new(pool.clone())),
        subscriber: Arc::new(PgChannelSubscriber::new(pool)),
        attachments,
    }
}

/// Notify side.
#[derive(Clone)]
pub struct PgNotifier {
    pool: PgPool,
}

impl PgNotifier {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotifyTransport for PgNotifier {
    async fn notify(&self, channel: &str, payload: &str) -> Result<(), TransportError> {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(channel)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Listen side.
#[derive(Clone)]
pub struct PgChannelSubscriber {
    pool: PgPool,
}

impl PgChannelSubscriber {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelSubscriber for PgChannelSubscriber {
    async fn listen(&self, channel: &str) -> Result<NotificationStream, TransportError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(channel).await?;
        debug!(channel = %channel, "LISTEN established");

        let stream = futures::stream::unfold(Some(listener), |state| async move {
            let mut listener = state?;
            match listener.try_recv().await {
                Ok(Some(notification)) => Some((Ok(notification.payload().to_owned()), Some(listener))),
                Ok(None) => Some((Err(TransportError::Transient("connection lost".into())), None)),
                Err(err) => Some((Err(TransportError::from(err)), None)),
            }
        });
        Ok(Box::pin(stream))
    }
}

/// Attachment table.
#[derive(Clone)]
pub struct PgAttachmentStore {
    pool: PgPool,
    queries: Queries,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Queries {
    create: String,
    insert: String,
    select: String,
    delete_older: String,
}

impl Queries {
    fn for_table(table: &str) -> Self {
        Self {
            create: format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                 id bigserial PRIMARY KEY, \
                 created_at timestamptz NOT NULL DEFAULT now(), \
                 payload bytea NOT NULL)"
            ),
            insert: format!("INSERT INTO {table} (payload) VALUES ($1) RETURNING id"),
            select: format!("SELECT payload FROM {table} WHERE id = $1"),
            delete_older: format!("DELETE FROM {table} WHERE created_at < now() - make_interval(secs => $1)"),
        }
    }
}

impl PgAttachmentStore {
    /// Store using `table`, which must be a plain or schema-qualified identifier.
    pub fn new(pool: PgPool, table: &str) -> Result<Self, ConfigError> {
        if !is_sql_identifier(table) {
            return Err(ConfigError::InvalidTableName(table.to_string()));
        }
        Ok(Self {
            pool,
            queries: Queries::for_table(table),
        })
    }

    /// Create the table if it does not exist.
    pub async fn ensure_table(&self) -> Result<(), TransportError> {
        sqlx::query(&self.queries.create).execute(&self.pool).await?;
        info!("Attachment table ready");
        Ok(())
    }
}

#[async_trait]
impl AttachmentStore for PgAttachmentStore {
    async fn store(&self, payload: &[u8]) -> Result<AttachmentId, TransportError> {
        let id: i64 = sqlx::query_scalar(&self.queries.insert)
            .bind(payload)
            .fetch_one(&self.pool)
            .await?;
        Ok(AttachmentId::new(id))
    }

    async fn fetch(&self, id: AttachmentId) -> Result<Option<Vec<u8>>, TransportError> {
        let payload: Option<Vec<u8>> = sqlx::query_scalar(&self.queries.select)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;
        Ok(payload)
    }

    async fn delete_older_than(&self, age: Duration) -> Result<u64, TransportError> {
        let result = sqlx::query(&self.queries.delete_older)
            .bind(age.as_secs_f64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
