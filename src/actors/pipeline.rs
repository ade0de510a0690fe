//! Shared delivery path of every ingestion transport
//!
//! A decoded measurement goes to the recorder queue first and to the hub
//! second. Both queues are bounded, so a slow store or a busy hub pushes back
//! on the transport that produced the measurement.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use super::hub::HubHandle;
use crate::Measurement;
use crate::codec::DecodeError;
use crate::telemetry::{DECODE_ERRORS, INGESTED, Telemetry};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("recorder is no longer accepting measurements")]
    RecorderClosed,

    #[error("hub is no longer accepting measurements")]
    HubClosed,
}

#[derive(Clone)]
pub struct Pipeline {
    recorder: mpsc::Sender<Measurement>,
    hub: HubHandle,
    telemetry: Telemetry,
}

impl Pipeline {
    pub fn new(recorder: mpsc::Sender<Measurement>, hub: HubHandle, telemetry: Telemetry) -> Self {
        Self {
            recorder,
            hub,
            telemetry,
        }
    }

    /// Hand a measurement to the recorder and the hub
    pub async fn dispatch(&self, measurement: Measurement) -> Result<(), PipelineError> {
        trace!(
            "dispatching {} for check {}",
            measurement.id,
            measurement.check_id()
        );

        self.recorder
            .send(measurement.clone())
            .await
            .map_err(|_| PipelineError::RecorderClosed)?;

        self.hub
            .broadcast(measurement)
            .await
            .map_err(|_| PipelineError::HubClosed)?;

        self.telemetry.incr(INGESTED);
        Ok(())
    }

    /// Account for an input unit that could not be decoded
    pub fn decode_failed(&self, source: &str, error: &DecodeError) {
        warn!("dropping undecodable measurement from {source}: {error}");
        self.telemetry.incr(DECODE_ERRORS);
    }
}
