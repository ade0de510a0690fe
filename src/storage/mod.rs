//! Time-windowed measurement storage
//!
//! Measurements are kept in one score-ordered collection per check, keyed as
//! `"<prefix>:<check_id>"`. The score is the measurement timestamp `t`.
//!
//! ## Backends
//!
//! - **In-Memory** (default): volatile, for tests and single-node setups
//! - **SQLite**: embedded and persistent, behind the `storage-sqlite` feature

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

use std::sync::Arc;

pub use backend::{HealthStatus, MeasurementStore, ScoreRange};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;

use crate::config::StorageConfig;

/// Default namespace prefix for per-check collections
pub const DEFAULT_KEY_PREFIX: &str = "measurements";

/// Store key of a check's collection
pub fn namespace(prefix: &str, check_id: &str) -> String {
    format!("{prefix}:{check_id}")
}

/// Open the store described by `config`
pub async fn open(config: &StorageConfig) -> StorageResult<Arc<dyn MeasurementStore>> {
    match config {
        StorageConfig::Memory => Ok(Arc::new(MemoryStore::new())),

        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => Ok(Arc::new(sqlite::SqliteStore::new(path).await?)),

        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::InvalidConfig(
            "sqlite storage requires the `storage-sqlite` feature".to_string(),
        )),
    }
}
