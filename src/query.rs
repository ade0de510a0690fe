//! Read side of the store: the last N seconds of a check's measurements
//!
//! Queries go straight to the store and never touch the ingestion path, so a
//! slow or failing read cannot hold up recording or fan-out.

use std::sync::Arc;

use tracing::{trace, warn};

use crate::Measurement;
use crate::clock::Clock;
use crate::codec;
use crate::storage::{MeasurementStore, ScoreRange, StorageResult, namespace};
use crate::telemetry::{QUERY_TIMER, Telemetry};

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn MeasurementStore>,
    clock: Arc<dyn Clock>,
    key_prefix: String,
    telemetry: Telemetry,
}

impl QueryService {
    pub fn new(
        store: Arc<dyn MeasurementStore>,
        clock: Arc<dyn Clock>,
        key_prefix: impl Into<String>,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            store,
            clock,
            key_prefix: key_prefix.into(),
            telemetry,
        }
    }

    /// Measurements of `check_id` with `t >= now - window_secs`, most recent first
    ///
    /// Entries that no longer decode are skipped. An unknown check yields an
    /// empty list.
    pub async fn get_range(
        &self,
        check_id: &str,
        window_secs: i64,
    ) -> StorageResult<Vec<Measurement>> {
        let key = namespace(&self.key_prefix, check_id);
        let from = self.clock.now().saturating_sub(window_secs);

        let payloads = self
            .telemetry
            .time(QUERY_TIMER, self.store.range_query(&key, ScoreRange::since(from)))
            .await?;

        trace!("{} entries for {key} since {from}", payloads.len());

        Ok(payloads
            .iter()
            .filter_map(|payload| match codec::from_json(payload) {
                Ok(measurement) => Some(measurement),
                Err(e) => {
                    warn!("skipping undecodable entry in {key}: {e}");
                    None
                }
            })
            .collect())
    }
}
