//! Metric exporters
//!
//! A sink receives a [`TelemetrySnapshot`] every flush interval. Sinks are
//! opaque to the pipeline: a failing sink is logged by the reporter and never
//! affects ingestion.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, trace};

use super::TelemetrySnapshot;
use crate::config::LibratoConfig;

/// Librato metrics API
pub const LIBRATO_ENDPOINT: &str = "https://metrics-api.librato.com/v1/metrics";

#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn report(&self, snapshot: &TelemetrySnapshot) -> Result<()>;
}

/// Writes each timer and counter to the log
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl MetricsSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn report(&self, snapshot: &TelemetrySnapshot) -> Result<()> {
        for (name, timer) in &snapshot.timers {
            info!(
                metric = %name,
                count = timer.count,
                p50_us = timer.p50_us,
                p95_us = timer.p95_us,
                p99_us = timer.p99_us,
                max_us = timer.max_us,
                "timer"
            );
        }
        for (name, value) in &snapshot.counters {
            info!(metric = %name, value, "counter");
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, PartialEq)]
struct LibratoMeasurement {
    name: String,
    value: f64,
}

#[derive(Debug, Serialize)]
struct LibratoPayload<'a> {
    source: &'a str,
    gauges: Vec<LibratoMeasurement>,
    counters: Vec<LibratoMeasurement>,
}

/// Pushes timer percentiles (milliseconds) and counters to Librato
pub struct LibratoSink {
    client: reqwest::Client,
    endpoint: String,
    config: LibratoConfig,
}

impl LibratoSink {
    pub fn new(config: LibratoConfig) -> Result<Self> {
        Self::with_endpoint(config, LIBRATO_ENDPOINT)
    }

    pub fn with_endpoint(config: LibratoConfig, endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            config,
        })
    }

    fn payload<'a>(&'a self, snapshot: &TelemetrySnapshot) -> LibratoPayload<'a> {
        let gauges = snapshot
            .timers
            .iter()
            .flat_map(|(name, timer)| {
                [
                    ("p50", timer.p50_us),
                    ("p95", timer.p95_us),
                    ("p99", timer.p99_us),
                ]
                .into_iter()
                .map(move |(suffix, micros)| LibratoMeasurement {
                    name: format!("{name}.{suffix}"),
                    value: micros as f64 / 1000.0,
                })
            })
            .collect();

        let counters = snapshot
            .counters
            .iter()
            .map(|(name, value)| LibratoMeasurement {
                name: name.clone(),
                value: *value as f64,
            })
            .collect();

        LibratoPayload {
            source: &self.config.source,
            gauges,
            counters,
        }
    }
}

#[async_trait]
impl MetricsSink for LibratoSink {
    fn name(&self) -> &str {
        "librato"
    }

    async fn report(&self, snapshot: &TelemetrySnapshot) -> Result<()> {
        if snapshot.timers.is_empty() && snapshot.counters.is_empty() {
            trace!("nothing to report to librato");
            return Ok(());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.config.email, Some(&self.config.token))
            .json(&self.payload(snapshot))
            .send()
            .await
            .context("failed to send metrics to librato")?;

        if !response.status().is_success() {
            anyhow::bail!("librato rejected metrics: HTTP {}", response.status());
        }

        trace!("reported metrics to librato");
        Ok(())
    }
}
