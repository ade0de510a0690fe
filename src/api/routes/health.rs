//! Health check endpoint

/// GET /health
///
/// Liveness only. Does not touch the store.
pub async fn health_check() -> &'static str {
    "OK\n"
}
