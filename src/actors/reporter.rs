//! ReporterActor - Periodic export of pipeline timers and counters
//!
//! ```text
//! Timer tick ─► Telemetry::snapshot() ─► [LogSink, LibratoSink, ...]
//!     ↑
//!     └─── Commands (FlushNow, Shutdown)
//! ```
//!
//! A sink that fails is logged and skipped for that tick; the others still
//! receive the snapshot.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, instrument, trace, warn};

use super::messages::ReporterCommand;
use crate::telemetry::Telemetry;
use crate::telemetry::sink::MetricsSink;

pub struct ReporterActor {
    telemetry: Telemetry,

    sinks: Vec<Box<dyn MetricsSink>>,

    interval_duration: Duration,

    command_rx: mpsc::Receiver<ReporterCommand>,
}

impl ReporterActor {
    pub fn new(
        telemetry: Telemetry,
        sinks: Vec<Box<dyn MetricsSink>>,
        interval_duration: Duration,
        command_rx: mpsc::Receiver<ReporterCommand>,
    ) -> Self {
        Self {
            telemetry,
            sinks,
            interval_duration,
            command_rx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!(
            "starting metrics reporter with {} sinks every {:?}",
            self.sinks.len(),
            self.interval_duration
        );

        let mut ticker = interval(self.interval_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; there is nothing to report yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.flush().await,

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        ReporterCommand::FlushNow { respond_to } => {
                            self.flush().await;
                            let _ = respond_to.send(());
                        }

                        ReporterCommand::Shutdown => {
                            debug!("received shutdown command");
                            self.flush().await;
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("metrics reporter stopped");
    }

    async fn flush(&self) {
        let snapshot = self.telemetry.snapshot();

        for sink in &self.sinks {
            match sink.report(&snapshot).await {
                Ok(()) => trace!("reported metrics to {}", sink.name()),
                Err(e) => warn!("failed to report metrics to {}: {e:#}", sink.name()),
            }
        }
    }
}

#[derive(Clone)]
pub struct ReporterHandle {
    sender: mpsc::Sender<ReporterCommand>,
}

impl ReporterHandle {
    pub fn spawn(
        telemetry: Telemetry,
        sinks: Vec<Box<dyn MetricsSink>>,
        interval_duration: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor = ReporterActor::new(telemetry, sinks, interval_duration, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Export now and wait until every sink has been called
    pub async fn flush_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ReporterCommand::FlushNow { respond_to: tx })
            .await
            .context("failed to send FlushNow command")?;

        rx.await.context("failed to receive flush confirmation")
    }

    /// Flush one last time and stop
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(ReporterCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }
}
