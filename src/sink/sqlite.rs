//! SQLite sink using sqlx.
//!
//! Inserts each batch in a single transaction into a table that is created on
//! connect if missing.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use super::sql::{DEFAULT_TABLE, Placeholder, insert_statement, is_valid_table_name};
use super::{Sink, SinkError};
use crate::measurement::Measurement;

/// Default maximum connections in the pool.
const DEFAULT_MAX_CONNECTIONS: u32 = 2;

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

fn default_enabled() -> bool {
    true
}

fn default_url() -> String {
    "sqlite:sensorscan.db".to_string()
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

/// Configuration for the SQLite sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteSinkConfig {
    /// Enable this sink (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Connection URL (default: "sqlite:sensorscan.db").
    #[serde(default = "default_url")]
    pub url: String,
    /// Target table (default: "measurements").
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for SqliteSinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_url(),
            table: default_table(),
        }
    }
}

/// Stores batches in a SQLite table.
pub struct SqliteSink {
    pool: SqlitePool,
    insert_stmt: String,
    name: String,
}

impl SqliteSink {
    /// Connect, enabling WAL mode, and create the table if needed.
    pub async fn connect(config: &SqliteSinkConfig) -> Result<Self, SinkError> {
        if !is_valid_table_name(&config.table) {
            return Err(SinkError::Config(format!(
                "invalid table name '{}'",
                config.table
            )));
        }

        let options = SqliteConnectOptions::from_str(&config.url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .acquire_timeout(DEFAULT_CONNECT_TIMEOUT)
            .connect_with(options)
            .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mac TEXT NOT NULL,
                name TEXT,
                ts TEXT NOT NULL,
                temperature REAL NOT NULL,
                humidity REAL NOT NULL,
                pressure REAL NOT NULL,
                acceleration_x INTEGER NOT NULL,
                acceleration_y INTEGER NOT NULL,
                acceleration_z INTEGER NOT NULL,
                movement_counter INTEGER NOT NULL,
                battery INTEGER NOT NULL
            )",
            config.table
        ))
        .execute(&pool)
        .await?;

        tracing::debug!(url = %config.url, table = %config.table, "SQLite sink ready");

        Ok(Self {
            pool,
            insert_stmt: insert_statement(&config.table, Placeholder::Question),
            name: format!("SQLite ({})", config.table),
        })
    }

    /// Underlying pool, for queries outside the sink contract.
    #[inline]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl std::fmt::Debug for SqliteSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSink")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Sink for SqliteSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn export(&self, batch: &[Measurement]) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Err(SinkError::NoMeasurements);
        }
        // Dropping an uncommitted transaction rolls it back.
        let mut tx = self.pool.begin().await?;
        for m in batch {
            sqlx::query(&self.insert_stmt)
                .bind(&m.addr)
                .bind(m.name.as_deref())
                .bind(m.ts)
                .bind(m.temperature)
                .bind(m.humidity)
                .bind(m.pressure)
                .bind(m.acceleration_x)
                .bind(m.acceleration_y)
                .bind(m.acceleration_z)
                .bind(i64::from(m.movement_counter))
                .bind(i64::from(m.battery_voltage))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config(dir: &tempfile::TempDir, table: &str) -> SqliteSinkConfig {
        SqliteSinkConfig {
            enabled: true,
            url: format!("sqlite:{}", dir.path().join("sink.db").display()),
            table: table.to_string(),
        }
    }

    #[tokio::test]
    async fn test_sqlite_sink_inserts_batch() {
        let dir = tempfile::tempdir().unwrap();
        let sink = SqliteSink::connect(&config(&dir, "measurements"))
            .await
            .unwrap();

        let batch = vec![
            Measurement::new("AA:BB", Utc::now())
                .with_name("Kitchen")
                .with_climate(22.0, 41.0, 1001.0)
                .with_acceleration(-12, 4, 1016),
            Measurement::new("CC:DD", Utc::now()).with_status(2950, 7),
        ];
        sink.export(&batch).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM measurements")
            .fetch_one(sink.pool())
            .await
            .unwrap();
        assert_eq!(count, 2);

        let (name, battery): (Option<String>, i64) =
            sqlx::query_as("SELECT name, battery FROM measurements WHERE mac = 'CC:DD'")
                .fetch_one(sink.pool())
                .await
                .unwrap();
        assert_eq!(name, None);
        assert_eq!(battery, 2950);

        let (x, z): (i64, i64) = sqlx::query_as(
            "SELECT acceleration_x, acceleration_z FROM measurements WHERE mac = 'AA:BB'",
        )
        .fetch_one(sink.pool())
        .await
        .unwrap();
        assert_eq!((x, z), (-12, 1016));

        sink.close().await.unwrap();
        assert!(sink.pool().is_closed());
    }

    #[tokio::test]
    async fn test_sqlite_sink_rejects_bad_table() {
        let dir = tempfile::tempdir().unwrap();
        let err = SqliteSink::connect(&config(&dir, "bad name"))
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Config(_)));
    }

    #[tokio::test]
    async fn test_sqlite_sink_rejects_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let sink = SqliteSink::connect(&config(&dir, "measurements"))
            .await
            .unwrap();
        assert!(matches!(
            sink.export(&[]).await,
            Err(SinkError::NoMeasurements)
        ));
    }
}
