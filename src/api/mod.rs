//! HTTP and WebSocket surface
//!
//! ## Endpoints
//!
//! - `GET /health` - Liveness
//! - `GET /stats` - Timers, counters, recorder and hub statistics
//! - `GET /checks/:check_id/measurements?range=<seconds>` - Recent measurements
//! - `WS /checks/:check_id/stream` - Live measurements of one check
//! - `POST /measurements` - Bulk ingest of a JSON array

pub mod error;
pub mod routes;
pub mod state;
pub mod types;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;
pub use types::{BulkIngestResponse, StatsResponse};

use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,

    /// Allow cross-origin requests from dashboards
    pub enable_cors: bool,
}

/// Build the router with all routes
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/stats", get(routes::stats::get_stats))
        .route(
            "/checks/:check_id/measurements",
            get(routes::measurements::get_measurements),
        )
        .route("/checks/:check_id/stream", get(websocket::stream_handler))
        .route("/measurements", post(routes::measurements::post_measurements))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Spawn the API server
///
/// Binding happens before this returns, so a bind failure is reported to the
/// caller. Returns the server's local address.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    let mut app = router(state);

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {}", config.bind_addr))?;
    let addr = listener.local_addr()?;

    info!("API server listening on {addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("API server error: {e}");
        }
    });

    Ok(addr)
}
