//! Measurement query and bulk ingest endpoints

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::Measurement;
use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::BulkIngestResponse,
};
use crate::codec;

/// Window used when `range` is omitted
pub const DEFAULT_RANGE_SECS: i64 = 10;

/// Query parameters of the range endpoint
///
/// `range` is kept as text so a malformed value produces our own JSON error.
#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    range: Option<String>,
}

fn parse_range(raw: Option<&str>) -> ApiResult<i64> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_RANGE_SECS);
    };

    let range: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::InvalidRequest(format!("range must be an integer, got {raw:?}")))?;

    if range < 0 {
        return Err(ApiError::InvalidRequest(format!(
            "range must not be negative, got {range}"
        )));
    }

    Ok(range)
}

/// GET /checks/:check_id/measurements?range=<seconds>
///
/// Measurements of the last `range` seconds, most recent first.
pub async fn get_measurements(
    State(state): State<ApiState>,
    Path(check_id): Path<String>,
    Query(params): Query<RangeQuery>,
) -> ApiResult<Json<Vec<Measurement>>> {
    let range = parse_range(params.range.as_deref())?;

    let measurements = state.query.get_range(&check_id, range).await?;

    debug!(
        "returning {} measurements for {check_id} over {range}s",
        measurements.len()
    );
    Ok(Json(measurements))
}

/// POST /measurements
///
/// Body is a JSON array of measurements. Elements that do not decode are
/// counted and skipped; the rest are dispatched in array order.
///
/// If the pipeline shuts down partway through, the request fails with `503`
/// and the error names how many elements were already accepted. Those stay
/// recorded.
pub async fn post_measurements(
    State(state): State<ApiState>,
    body: Result<Json<Vec<Value>>, JsonRejection>,
) -> ApiResult<Json<BulkIngestResponse>> {
    let Json(values) = body.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;

    let mut response = BulkIngestResponse {
        accepted: 0,
        rejected: 0,
    };

    for value in values {
        match codec::from_value(value) {
            Ok(measurement) => {
                state
                    .pipeline
                    .dispatch(measurement)
                    .await
                    .map_err(|e| {
                        ApiError::Unavailable(format!(
                            "{e} after accepting {} measurements",
                            response.accepted
                        ))
                    })?;
                response.accepted += 1;
            }
            Err(e) => {
                state.pipeline.decode_failed("POST /measurements", &e);
                response.rejected += 1;
            }
        }
    }

    Ok(Json(response))
}
