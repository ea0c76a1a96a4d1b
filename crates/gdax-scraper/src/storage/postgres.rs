use async_trait::async_trait;
use deadpool_postgres::{Config, Pool, Runtime};
use gdax_feed::{EventRecord, SnapshotRecord};
use tokio_postgres::NoTls;
use tracing::{debug, info};

use super::Store;
use crate::error::StorageError;
use crate::payload::{
    bulk_insert_sql, rows_per_statement, EventRow, LevelRow, Param, MESSAGES_TABLE,
    MESSAGE_COLUMNS, SNAPSHOTS_TABLE, SNAPSHOT_COLUMNS,
};

/// Create a connection pool from a database URL
pub fn create_pool(database_url: &str) -> Result<Pool, StorageError> {
    let pg_config: tokio_postgres::Config = database_url
        .parse()
        .map_err(|e: tokio_postgres::Error| StorageError::PoolSetup(format!("invalid database URL: {e}")))?;

    let mut cfg = Config::new();
    if let Some(host) = pg_config.get_hosts().first() {
        match host {
            tokio_postgres::config::Host::Tcp(h) => cfg.host = Some(h.clone()),
            #[cfg(unix)]
            tokio_postgres::config::Host::Unix(p) => {
                cfg.host = Some(p.to_string_lossy().to_string())
            }
        }
    }
    if let Some(port) = pg_config.get_ports().first() {
        cfg.port = Some(*port);
    }
    if let Some(user) = pg_config.get_user() {
        cfg.user = Some(user.to_string());
    }
    if let Some(password) = pg_config.get_password() {
        cfg.password = Some(String::from_utf8_lossy(password).to_string());
    }
    if let Some(dbname) = pg_config.get_dbname() {
        cfg.dbname = Some(dbname.to_string());
    }

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| StorageError::PoolSetup(e.to_string()))
}

/// PostgreSQL-backed [`Store`]
pub struct PgStore {
    pool: Pool,
    insert_message_sql: String,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            insert_message_sql: bulk_insert_sql(MESSAGES_TABLE, &MESSAGE_COLUMNS, 1),
        }
    }

    pub fn connect(database_url: &str) -> Result<Self, StorageError> {
        Ok(Self::new(create_pool(database_url)?))
    }

    /// Round trip to the server so a bad URL fails at start-up
    pub async fn ping(&self) -> Result<(), StorageError> {
        let client = self.pool.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    /// Create tables and indexes if they do not exist
    pub async fn prepare_schema(&self) -> Result<(), StorageError> {
        let client = self.pool.get().await?;
        client
            .batch_execute(include_str!("../../migrations/001_initial.sql"))
            .await?;
        info!("database schema ready");
        Ok(())
    }

    /// Insert flattened row parameters in one transaction, split into
    /// statements that stay under the bind parameter limit.
    async fn insert_rows(
        &self,
        table: &str,
        columns: &[&str],
        params: &[Param<'_>],
    ) -> Result<u64, StorageError> {
        if params.is_empty() {
            return Ok(0);
        }

        let width = columns.len();
        let chunk_len = rows_per_statement(width) * width;

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let mut written = 0;
        for chunk in params.chunks(chunk_len) {
            let sql = bulk_insert_sql(table, columns, chunk.len() / width);
            written += tx.execute(sql.as_str(), chunk).await?;
        }
        tx.commit().await?;

        debug!(table, rows = written, "bulk insert committed");
        Ok(written)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_event(&self, event: &EventRecord) -> Result<u64, StorageError> {
        let client = self.pool.get().await?;
        let stmt = client.prepare_cached(&self.insert_message_sql).await?;
        let row = EventRow::new(event);
        Ok(client.execute(&stmt, &row.params()).await?)
    }

    async fn insert_events(&self, events: &[EventRecord]) -> Result<u64, StorageError> {
        let rows: Vec<EventRow> = events.iter().map(EventRow::new).collect();
        let params: Vec<Param> = rows.iter().flat_map(|row| row.params()).collect();
        self.insert_rows(MESSAGES_TABLE, &MESSAGE_COLUMNS, &params).await
    }

    async fn insert_snapshots(&self, snapshots: &[SnapshotRecord]) -> Result<u64, StorageError> {
        let rows: Vec<LevelRow> = snapshots.iter().flat_map(LevelRow::from_snapshot).collect();
        let params: Vec<Param> = rows.iter().flat_map(|row| row.params()).collect();
        self.insert_rows(SNAPSHOTS_TABLE, &SNAPSHOT_COLUMNS, &params).await
    }
}
