//! API shared state containing actor handles

use crate::actors::{hub::HubHandle, pipeline::Pipeline, recorder::RecorderHandle};
use crate::query::QueryService;
use crate::telemetry::Telemetry;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Range queries over the store
    pub query: QueryService,

    /// Delivery path for bulk-posted measurements
    pub pipeline: Pipeline,

    /// Registration of stream subscribers
    pub hub: HubHandle,

    pub recorder: RecorderHandle,

    pub telemetry: Telemetry,

    /// Messages buffered per stream before the hub drops it
    pub subscriber_buffer: usize,
}
