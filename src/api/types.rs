//! Response bodies of the HTTP API

use serde::{Deserialize, Serialize};

use crate::actors::messages::{HubStats, RecorderStats};
use crate::telemetry::TelemetrySnapshot;

/// Result of `POST /measurements`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkIngestResponse {
    /// Measurements handed to the recorder and the hub
    pub accepted: usize,

    /// Array elements that did not decode as a measurement
    pub rejected: usize,
}

/// Result of `GET /stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub timestamp: String,

    #[serde(flatten)]
    pub telemetry: TelemetrySnapshot,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorder: Option<RecorderStats>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hub: Option<HubStats>,
}
