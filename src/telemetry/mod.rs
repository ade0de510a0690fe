//! Pipeline instrumentation
//!
//! Named duration timers backed by HDR histograms, plus monotonically
//! increasing counters. Timers are cumulative since process start. Exporting
//! is done by the reporter actor through [`sink::MetricsSink`]s.

pub mod sink;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use serde::Serialize;
use tracing::warn;

/// Time to serialize and append one measurement
pub const RECORD_TIMER: &str = "canaryd.record";
/// Time to trim a check's collection after a write
pub const TRIM_TIMER: &str = "canaryd.trim";
/// Time to answer a range query
pub const QUERY_TIMER: &str = "canaryd.query";
/// Time for the hub to fan one measurement out
pub const BROADCAST_TIMER: &str = "canaryd.broadcast";

/// Input units dropped because they could not be decoded
pub const DECODE_ERRORS: &str = "canaryd.decode_errors";
/// Measurements accepted by any transport
pub const INGESTED: &str = "canaryd.ingested";

/// One hour, in microseconds
const MAX_TRACKABLE_MICROS: u64 = 3_600_000_000;

#[derive(Default)]
struct Registry {
    timers: HashMap<&'static str, Histogram<u64>>,
    counters: HashMap<&'static str, u64>,
}

/// Shared handle to the timer and counter registry
#[derive(Clone, Default)]
pub struct Telemetry {
    registry: Arc<Mutex<Registry>>,
}

/// Summary of one timer, in microseconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerSnapshot {
    pub count: u64,
    pub min_us: u64,
    pub mean_us: f64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Point-in-time copy of every timer and counter
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub timers: BTreeMap<String, TimerSnapshot>,
    pub counters: BTreeMap<String, u64>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add one sample to the timer `name`
    pub fn record(&self, name: &'static str, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        let mut registry = self.lock();

        if !registry.timers.contains_key(name) {
            match Histogram::new_with_bounds(1, MAX_TRACKABLE_MICROS, 3) {
                Ok(histogram) => {
                    registry.timers.insert(name, histogram);
                }
                Err(e) => {
                    warn!("cannot create histogram for {name}: {e}");
                    return;
                }
            }
        }

        if let Some(histogram) = registry.timers.get_mut(name) {
            histogram.saturating_record(micros.max(1));
        }
    }

    /// Await `fut` and record how long it took under `name`
    pub async fn time<F, T>(&self, name: &'static str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let start = Instant::now();
        let output = fut.await;
        self.record(name, start.elapsed());
        output
    }

    pub fn incr(&self, name: &'static str) {
        self.add(name, 1);
    }

    pub fn add(&self, name: &'static str, value: u64) {
        *self.lock().counters.entry(name).or_default() += value;
    }

    /// Current value of a counter (0 if never incremented)
    pub fn counter(&self, name: &str) -> u64 {
        self.lock().counters.get(name).copied().unwrap_or_default()
    }

    /// Number of samples recorded by a timer
    pub fn timer_count(&self, name: &str) -> u64 {
        self.lock().timers.get(name).map(Histogram::len).unwrap_or_default()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let registry = self.lock();

        let timers = registry
            .timers
            .iter()
            .map(|(name, h)| {
                (
                    name.to_string(),
                    TimerSnapshot {
                        count: h.len(),
                        min_us: h.min(),
                        mean_us: h.mean(),
                        p50_us: h.value_at_quantile(0.50),
                        p95_us: h.value_at_quantile(0.95),
                        p99_us: h.value_at_quantile(0.99),
                        max_us: h.max(),
                    },
                )
            })
            .collect();

        let counters = registry
            .counters
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect();

        TelemetrySnapshot { timers, counters }
    }
}
