//! SQLite measurement store
//!
//! Every key's collection lives in one `measurements` table indexed on
//! `(key, score)`. The autoincrement `seq` column breaks ties between equal
//! scores, so the ordering contract matches the in-memory store.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Range queries do not block the recorder's writes
//! - **Migrations**: Schema versioning with sqlx

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info, instrument};

use super::backend::{HealthStatus, MeasurementStore, ScoreRange};
use super::error::{StorageError, StorageResult};

/// SQLite measurement store
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and run migrations
    ///
    /// ```no_run
    /// # use canaryd::storage::sqlite::SqliteStore;
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = SqliteStore::new("./canaryd.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("opening SQLite measurement store at {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }
}

#[async_trait]
impl MeasurementStore for SqliteStore {
    async fn append(&self, key: &str, score: i64, payload: &str) -> StorageResult<()> {
        sqlx::query("INSERT INTO measurements (key, score, payload) VALUES (?, ?, ?)")
            .bind(key)
            .bind(score)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn range_query(&self, key: &str, range: ScoreRange) -> StorageResult<Vec<String>> {
        let members = sqlx::query_scalar::<_, String>(
            r#"
            SELECT payload
            FROM measurements
            WHERE key = ? AND score >= ? AND score <= ?
            ORDER BY score DESC, seq DESC
            "#,
        )
        .bind(key)
        .bind(range.min.unwrap_or(i64::MIN))
        .bind(range.max.unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::ReadFailed(e.to_string()))?;

        debug!("range query returned {} members", members.len());
        Ok(members)
    }

    async fn trim_below(&self, key: &str, threshold: i64) -> StorageResult<usize> {
        let result = sqlx::query("DELETE FROM measurements WHERE key = ? AND score < ?")
            .bind(key)
            .bind(threshold)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::TrimFailed(e.to_string()))?;

        Ok(result.rows_affected() as usize)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let members: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM measurements")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::ReadFailed(e.to_string()))?;

        Ok(HealthStatus {
            healthy: true,
            message: "SQLite store operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "sqlite".to_string()),
                ("path".to_string(), self.db_path.clone()),
                ("members".to_string(), members.to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite store");
        self.pool.close().await;
        Ok(())
    }
}
