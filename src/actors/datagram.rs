//! DatagramActor - One protobuf-encoded measurement per UDP datagram
//!
//! Datagrams are never acknowledged. A datagram that does not decode is
//! counted and dropped; the listener keeps serving. Socket errors after
//! startup are retried after a fixed delay. Only a failed bind is fatal.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, trace, warn};

use super::messages::ListenerCommand;
use super::pipeline::Pipeline;
use crate::codec;

/// Largest payload a UDP datagram can carry
const MAX_DATAGRAM: usize = 65_536;

pub struct DatagramActor {
    socket: UdpSocket,

    pipeline: Pipeline,

    retry: Duration,

    command_rx: mpsc::Receiver<ListenerCommand>,
}

impl DatagramActor {
    pub fn new(
        socket: UdpSocket,
        pipeline: Pipeline,
        retry: Duration,
        command_rx: mpsc::Receiver<ListenerCommand>,
    ) -> Self {
        Self {
            socket,
            pipeline,
            retry,
            command_rx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting datagram listener");

        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, peer)) => {
                            if !self.handle(&buf[..len], peer).await {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("failed to receive datagram: {e}");
                            if !self.back_off().await {
                                break;
                            }
                        }
                    }
                }

                _ = self.command_rx.recv() => {
                    debug!("received shutdown command");
                    break;
                }
            }
        }

        debug!("datagram listener stopped");
    }

    /// Wait out the retry delay. Returns false if told to stop meanwhile.
    async fn back_off(&mut self) -> bool {
        trace!("resuming in {:?}", self.retry);

        tokio::select! {
            _ = sleep(self.retry) => true,

            _ = self.command_rx.recv() => {
                debug!("received shutdown command");
                false
            }
        }
    }

    /// Decode and dispatch one datagram. Returns false once the pipeline is gone.
    async fn handle(&self, bytes: &[u8], peer: SocketAddr) -> bool {
        trace!("received {} bytes from {peer}", bytes.len());

        match codec::decode_datagram(bytes) {
            Ok(measurement) => match self.pipeline.dispatch(measurement).await {
                Ok(()) => true,
                Err(e) => {
                    error!("stopping datagram listener: {e}");
                    false
                }
            },
            Err(e) => {
                self.pipeline.decode_failed(&peer.to_string(), &e);
                true
            }
        }
    }
}

/// Handle for a DatagramActor
#[derive(Clone)]
pub struct DatagramHandle {
    sender: mpsc::Sender<ListenerCommand>,

    local_addr: SocketAddr,
}

impl DatagramHandle {
    /// Bind `addr` and start listening
    ///
    /// Fails if the socket cannot be bound.
    pub async fn bind(addr: SocketAddr, pipeline: Pipeline, retry: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("failed to bind datagram listener on {addr}"))?;
        let local_addr = socket
            .local_addr()
            .context("failed to read datagram listener address")?;

        info!("datagram listener on {local_addr}");

        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let actor = DatagramActor::new(socket, pipeline, retry, cmd_rx);
        tokio::spawn(actor.run());

        Ok(Self {
            sender: cmd_tx,
            local_addr,
        })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(ListenerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }
}
