pub mod actors;
pub mod api;
pub mod clock;
pub mod codec;
pub mod config;
pub mod query;
pub mod storage;
pub mod telemetry;

use serde::{Deserialize, Serialize};

/// A monitored target. `id` is the partition key for storage and fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Check {
    pub id: String,
    #[serde(default)]
    pub url: String,
}

/// One observation of a [`Check`] at a point in time.
///
/// Optional diagnostics use explicit presence: an unset field is omitted from
/// the JSON representation, a field that is set to zero is kept.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Measurement {
    pub check: Check,

    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub location: String,

    /// Unix timestamp in seconds, used as the store score
    pub t: i64,

    #[serde(default)]
    pub exit_status: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namelookup_time: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_time: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starttransfer_time: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_download: Option<f64>,
}

impl Measurement {
    /// Partition key of this measurement
    pub fn check_id(&self) -> &str {
        &self.check.id
    }
}
