//! Pipeline statistics endpoint

use axum::{Json, extract::State};

use crate::api::{state::ApiState, types::StatsResponse};

/// GET /stats
///
/// Timer and counter snapshot plus recorder and hub statistics. Actor stats
/// are omitted when the actor no longer answers.
pub async fn get_stats(State(state): State<ApiState>) -> Json<StatsResponse> {
    let (recorder, hub) = tokio::join!(state.recorder.get_stats(), state.hub.get_stats());

    Json(StatsResponse {
        timestamp: chrono::Utc::now().to_rfc3339(),
        telemetry: state.telemetry.snapshot(),
        recorder,
        hub,
    })
}
