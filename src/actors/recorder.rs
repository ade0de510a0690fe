//! RecorderActor - Persists measurements and enforces retention
//!
//! Every measurement is appended to its check's collection and the same
//! collection is then trimmed to the retention window. There is no batching:
//! once a measurement leaves the queue it is either stored or the recorder
//! stops.
//!
//! ## Message Flow
//!
//! ```text
//! Pipeline ──Measurement──► RecorderActor ──append──► store
//!                                 │        └─trim_below(now - retention)
//!                                 └─── Commands (GetStats, Shutdown)
//! ```
//!
//! A store failure ends [`RecorderActor::run`] with an error. The binary
//! treats that as fatal and exits so a supervisor can restart the process.

use std::sync::Arc;

use anyhow::Context;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, trace, warn};

use super::messages::{RecorderCommand, RecorderStats};
use crate::Measurement;
use crate::clock::Clock;
use crate::codec;
use crate::storage::{MeasurementStore, StorageError, namespace};
use crate::telemetry::{RECORD_TIMER, TRIM_TIMER, Telemetry};

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("failed to serialize measurement {id}: {source}")]
    Serialization {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] StorageError),
}

/// Writes measurements to the store and keeps each collection within retention
pub struct Recorder {
    store: Arc<dyn MeasurementStore>,
    clock: Arc<dyn Clock>,
    retention_secs: i64,
    key_prefix: String,
    telemetry: Telemetry,
}

impl Recorder {
    pub fn new(
        store: Arc<dyn MeasurementStore>,
        clock: Arc<dyn Clock>,
        retention_secs: i64,
        key_prefix: impl Into<String>,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            store,
            clock,
            retention_secs,
            key_prefix: key_prefix.into(),
            telemetry,
        }
    }

    /// Append `measurement` and trim its collection
    ///
    /// Returns the number of entries the trim removed.
    pub async fn record(&self, measurement: &Measurement) -> Result<usize, RecorderError> {
        let payload = codec::to_json(measurement).map_err(|source| RecorderError::Serialization {
            id: measurement.id.clone(),
            source,
        })?;
        let key = namespace(&self.key_prefix, measurement.check_id());

        self.telemetry
            .time(RECORD_TIMER, self.store.append(&key, measurement.t, &payload))
            .await?;

        let threshold = self.clock.now() - self.retention_secs;
        let trimmed = self
            .telemetry
            .time(TRIM_TIMER, self.store.trim_below(&key, threshold))
            .await?;

        trace!(
            "recorded {} for {key} at t={}, trimmed {trimmed}",
            measurement.id, measurement.t
        );

        Ok(trimmed)
    }
}

/// Actor draining the measurement queue into a [`Recorder`]
pub struct RecorderActor {
    recorder: Recorder,

    measurement_rx: mpsc::Receiver<Measurement>,

    command_rx: mpsc::Receiver<RecorderCommand>,

    stats: RecorderStats,
}

impl RecorderActor {
    pub fn new(
        recorder: Recorder,
        measurement_rx: mpsc::Receiver<Measurement>,
        command_rx: mpsc::Receiver<RecorderCommand>,
    ) -> Self {
        Self {
            recorder,
            measurement_rx,
            command_rx,
            stats: RecorderStats::default(),
        }
    }

    /// Run until shutdown, until every producer is gone, or until the store fails
    #[instrument(skip(self))]
    pub async fn run(mut self) -> Result<(), RecorderError> {
        debug!("starting recorder");

        loop {
            tokio::select! {
                Some(measurement) = self.measurement_rx.recv() => {
                    self.handle(measurement).await?;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        RecorderCommand::GetStats { respond_to } => {
                            let _ = respond_to.send(self.stats.clone());
                        }

                        RecorderCommand::Shutdown => {
                            debug!("received shutdown command, draining queue");
                            while let Ok(measurement) = self.measurement_rx.try_recv() {
                                self.handle(measurement).await?;
                            }
                            break;
                        }
                    }
                }

                else => {
                    warn!("all producers gone, shutting down");
                    break;
                }
            }
        }

        debug!(
            "recorder stopped after {} measurements",
            self.stats.recorded
        );
        Ok(())
    }

    async fn handle(&mut self, measurement: Measurement) -> Result<(), RecorderError> {
        match self.recorder.record(&measurement).await {
            Ok(trimmed) => {
                self.stats.recorded += 1;
                self.stats.trimmed += trimmed as u64;
                Ok(())
            }
            Err(RecorderError::Serialization { id, source }) => {
                // Nothing reached the store, so this is not a durability problem.
                warn!("dropping measurement {id}: {source}");
                Ok(())
            }
            Err(e) => {
                error!(
                    "store failure while recording for check {}: {e}",
                    measurement.check_id()
                );
                Err(e)
            }
        }
    }
}

/// Handle for the RecorderActor
#[derive(Clone)]
pub struct RecorderHandle {
    sender: mpsc::Sender<RecorderCommand>,
    measurements: mpsc::Sender<Measurement>,
}

impl RecorderHandle {
    /// Spawn the recorder with a measurement queue of `queue` entries
    ///
    /// The returned task resolves when the recorder stops; an `Err` means the
    /// store failed.
    pub fn spawn(
        recorder: Recorder,
        queue: usize,
    ) -> (Self, JoinHandle<Result<(), RecorderError>>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (measurement_tx, measurement_rx) = mpsc::channel(queue);

        let actor = RecorderActor::new(recorder, measurement_rx, cmd_rx);
        let task = tokio::spawn(actor.run());

        (
            Self {
                sender: cmd_tx,
                measurements: measurement_tx,
            },
            task,
        )
    }

    /// Producer side of the measurement queue
    pub fn measurement_sender(&self) -> mpsc::Sender<Measurement> {
        self.measurements.clone()
    }

    /// Queue one measurement, waiting for room if the queue is full
    pub async fn record(&self, measurement: Measurement) -> anyhow::Result<()> {
        self.measurements
            .send(measurement)
            .await
            .context("recorder is no longer running")
    }

    pub async fn get_stats(&self) -> Option<RecorderStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RecorderCommand::GetStats { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.sender
            .send(RecorderCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }
}
