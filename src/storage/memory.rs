//! In-memory measurement store (no persistence)
//!
//! Each key maps to a `BTreeMap` ordered by `(score, sequence)`. The sequence
//! number is global and strictly increasing, so equal scores never collide and
//! keep their insertion order.
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Single process**: Not shared between daemon instances

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::backend::{HealthStatus, MeasurementStore, ScoreRange};
use super::error::StorageResult;

type Series = BTreeMap<(i64, u64), String>;

#[derive(Debug, Default)]
struct Inner {
    series: HashMap<String, Series>,
    next_seq: u64,
}

/// In-memory measurement store
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create a new, empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Total members across all keys
    pub async fn len(&self) -> usize {
        self.inner
            .read()
            .await
            .series
            .values()
            .map(BTreeMap::len)
            .sum()
    }
}

fn lower_bound(range: &ScoreRange) -> Bound<(i64, u64)> {
    match range.min {
        Some(min) => Bound::Included((min, 0)),
        None => Bound::Unbounded,
    }
}

fn upper_bound(range: &ScoreRange) -> Bound<(i64, u64)> {
    match range.max {
        Some(max) => Bound::Included((max, u64::MAX)),
        None => Bound::Unbounded,
    }
}

#[async_trait]
impl MeasurementStore for MemoryStore {
    async fn append(&self, key: &str, score: i64, payload: &str) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;

        inner
            .series
            .entry(key.to_string())
            .or_default()
            .insert((score, seq), payload.to_string());

        trace!("appended to {key} at score {score}");
        Ok(())
    }

    async fn range_query(&self, key: &str, range: ScoreRange) -> StorageResult<Vec<String>> {
        if let (Some(min), Some(max)) = (range.min, range.max)
            && min > max
        {
            return Ok(Vec::new());
        }

        let inner = self.inner.read().await;
        let members = inner
            .series
            .get(key)
            .map(|series| {
                series
                    .range((lower_bound(&range), upper_bound(&range)))
                    .rev()
                    .map(|(_, payload)| payload.clone())
                    .collect()
            })
            .unwrap_or_default();

        Ok(members)
    }

    async fn trim_below(&self, key: &str, threshold: i64) -> StorageResult<usize> {
        let mut inner = self.inner.write().await;

        let Some(series) = inner.series.get_mut(key) else {
            return Ok(0);
        };

        let kept = series.split_off(&(threshold, 0));
        let removed = series.len();
        *series = kept;

        if series.is_empty() {
            inner.series.remove(key);
        }

        if removed > 0 {
            debug!("trimmed {removed} members of {key} below {threshold}");
        }
        Ok(removed)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let inner = self.inner.read().await;
        let members: usize = inner.series.values().map(BTreeMap::len).sum();

        Ok(HealthStatus {
            healthy: true,
            message: "In-memory store operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("keys".to_string(), inner.series.len().to_string()),
                ("members".to_string(), members.to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory store (no-op)");
        Ok(())
    }
}
