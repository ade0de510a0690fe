//! Measurement store trait definition
//!
//! A store is a set of independently ordered collections, one per key. Every
//! member carries an integer score (the measurement timestamp). Using the
//! timestamp as the score turns "the last N seconds" into a single range scan
//! and retention into a single trim.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::StorageResult;

/// Inclusive score bounds for a range query. `None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoreRange {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl ScoreRange {
    /// `[-inf, +inf]`
    pub fn all() -> Self {
        Self::default()
    }

    /// `[min, +inf]`
    pub fn since(min: i64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    /// `[min, max]`
    pub fn between(min: i64, max: i64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn contains(&self, score: i64) -> bool {
        self.min.is_none_or(|min| score >= min) && self.max.is_none_or(|max| score <= max)
    }
}

/// Health status of the store
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the store operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Ordered, score-keyed collections of serialized measurements
///
/// ## Thread Safety
///
/// One store is shared by the recorder and the query path, so
/// implementations must be `Send + Sync` and safe under concurrent calls.
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Insert `payload` under `key` with `score`
    ///
    /// Equal scores never overwrite each other: every append adds a member.
    async fn append(&self, key: &str, score: i64, payload: &str) -> StorageResult<()>;

    /// Members of `key` with a score inside `range`
    ///
    /// Ordered by score descending; members with equal scores come back in
    /// reverse insertion order (latest first). Unknown keys yield an empty
    /// vector, not an error.
    async fn range_query(&self, key: &str, range: ScoreRange) -> StorageResult<Vec<String>>;

    /// Remove members of `key` with a score strictly below `threshold`
    ///
    /// Returns the number of removed members. Removing nothing is not an error.
    async fn trim_below(&self, key: &str, threshold: i64) -> StorageResult<usize>;

    /// Lightweight liveness probe of the backing store
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Release resources
    async fn close(&self) -> StorageResult<()>;
}
