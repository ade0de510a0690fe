//! SensorActor - Streams measurements from an upstream sensor over HTTP
//!
//! The sensor answers a `GET` with a long-lived body made of concatenated JSON
//! measurements. Each complete value is decoded and dispatched as soon as it
//! arrives.
//!
//! ## Message Flow
//!
//! ```text
//! GET url → chunk → JsonStreamDecoder → Measurement → Pipeline → [Recorder, Hub]
//!    ↑                                        │
//!    └──── fixed retry delay ◄── stream ended / HTTP error / corrupt stream
//! ```
//!
//! A value that is valid JSON but not a measurement is dropped and counted.
//! A syntax error makes the rest of the body unreadable, so it is counted and
//! the connection is re-established after the retry delay.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, trace, warn};

use super::messages::ListenerCommand;
use super::pipeline::{Pipeline, PipelineError};
use crate::codec::{self, JsonStreamDecoder};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Actor that keeps one sensor stream open
pub struct SensorActor {
    url: String,

    /// Reused across reconnects
    client: reqwest::Client,

    pipeline: Pipeline,

    retry: Duration,

    command_rx: mpsc::Receiver<ListenerCommand>,
}

impl SensorActor {
    pub fn new(
        url: String,
        pipeline: Pipeline,
        retry: Duration,
        command_rx: mpsc::Receiver<ListenerCommand>,
    ) -> Result<Self> {
        // No overall timeout: the body is expected to stay open indefinitely.
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            url,
            client,
            pipeline,
            retry,
            command_rx,
        })
    }

    #[instrument(skip(self), fields(sensor = %self.url))]
    pub async fn run(mut self) {
        debug!("starting sensor poller");

        loop {
            tokio::select! {
                result = Self::stream_once(&self.client, &self.url, &self.pipeline) => {
                    match result {
                        Ok(()) => debug!("sensor closed the stream"),
                        Err(e) if e.downcast_ref::<PipelineError>().is_some() => {
                            error!("stopping sensor poller: {e:#}");
                            break;
                        }
                        Err(e) => warn!("sensor stream failed: {e:#}"),
                    }
                }

                cmd = self.command_rx.recv() => {
                    if let Some(ListenerCommand::Shutdown) = cmd {
                        debug!("received shutdown command");
                    }
                    break;
                }
            }

            trace!("reconnecting in {:?}", self.retry);

            tokio::select! {
                _ = sleep(self.retry) => {}

                _ = self.command_rx.recv() => break,
            }
        }

        debug!("sensor poller stopped");
    }

    /// Read one response body to the end
    async fn stream_once(client: &reqwest::Client, url: &str, pipeline: &Pipeline) -> Result<()> {
        let mut response = client
            .get(url)
            .send()
            .await
            .context("failed to connect to sensor")?;

        if response.status() != StatusCode::OK {
            anyhow::bail!("HTTP error: {}", response.status());
        }

        info!("streaming measurements from {url}");

        let mut decoder = JsonStreamDecoder::new();

        while let Some(chunk) = response
            .chunk()
            .await
            .context("failed to read sensor stream")?
        {
            for value in decoder.push(&chunk) {
                match value {
                    Ok(value) => match codec::from_value(value) {
                        Ok(measurement) => pipeline.dispatch(measurement).await?,
                        Err(e) => pipeline.decode_failed(url, &e),
                    },
                    Err(e) => {
                        pipeline.decode_failed(url, &e);
                        return Err(e).context("sensor stream is corrupt");
                    }
                }
            }
        }

        if decoder.pending() > 0 {
            warn!(
                "sensor stream ended inside a value, discarding {} bytes",
                decoder.pending()
            );
        }

        Ok(())
    }
}

/// Handle for a SensorActor
#[derive(Clone)]
pub struct SensorHandle {
    sender: mpsc::Sender<ListenerCommand>,

    pub url: String,
}

impl SensorHandle {
    pub fn spawn(url: impl Into<String>, pipeline: Pipeline, retry: Duration) -> Result<Self> {
        let url = url.into();
        let (cmd_tx, cmd_rx) = mpsc::channel(4);

        let actor = SensorActor::new(url.clone(), pipeline, retry, cmd_rx)?;
        tokio::spawn(actor.run());

        Ok(Self {
            sender: cmd_tx,
            url,
        })
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(ListenerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }
}
