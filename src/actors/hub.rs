//! HubActor - Live fan-out of measurements to stream subscribers
//!
//! The hub owns the registry mapping a check id to its subscribers. Nothing
//! else can reach that map: registration, removal and broadcast are requests
//! on a single queue, handled one at a time by [`HubActor::run`]. That makes
//! the three operations linearizable without a lock, and guarantees that each
//! subscriber sees broadcasts in the order the hub received them.
//!
//! ## Message Flow
//!
//! ```text
//! Pipeline ──Broadcast──┐
//! Stream open ─Register─┼──► HubActor ──try_send──► subscriber sink (per stream)
//! Stream close ─Unreg.──┘        │
//!                                └── failed delivery → subscriber removed
//! ```
//!
//! Delivery never awaits: a sink that is full or closed counts as failed and
//! is dropped on the spot, so one slow stream cannot hold up the others.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, error, instrument, trace, warn};

use super::messages::{HubCommand, HubStats};
use crate::Measurement;
use crate::codec;
use crate::telemetry::{BROADCAST_TIMER, Telemetry};

/// Identity of one registered subscriber. Never reused.
pub type SubscriberId = u64;

/// Proof of registration, needed to unregister
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub id: SubscriberId,
    pub check_id: String,
}

/// Why a payload could not be handed to a subscriber
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("subscriber is not keeping up")]
    Lagging,

    #[error("subscriber stream is closed")]
    Closed,
}

/// Destination of a subscriber's serialized measurements
///
/// `deliver` is called from inside the hub loop and must not block.
pub trait SubscriberSink: Send + Sync + Debug + 'static {
    fn deliver(&self, payload: Arc<str>) -> Result<(), DeliveryError>;
}

impl SubscriberSink for mpsc::Sender<Arc<str>> {
    fn deliver(&self, payload: Arc<str>) -> Result<(), DeliveryError> {
        self.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Lagging,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

#[derive(Debug)]
struct Subscriber {
    id: SubscriberId,
    sink: Box<dyn SubscriberSink>,
}

/// Actor owning the subscriber registry
pub struct HubActor {
    command_rx: mpsc::Receiver<HubCommand>,

    /// Subscribers by check id. Empty entries are removed.
    subscribers: HashMap<String, Vec<Subscriber>>,

    next_id: SubscriberId,

    delivered: u64,

    dropped: u64,

    telemetry: Telemetry,
}

impl HubActor {
    pub fn new(command_rx: mpsc::Receiver<HubCommand>, telemetry: Telemetry) -> Self {
        Self {
            command_rx,
            subscribers: HashMap::new(),
            next_id: 1,
            delivered: 0,
            dropped: 0,
            telemetry,
        }
    }

    /// Run the control loop until shutdown or until every handle is gone
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting hub");

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                HubCommand::Register {
                    check_id,
                    sink,
                    respond_to,
                } => {
                    let subscription = self.register(check_id, sink);
                    if respond_to.send(subscription.clone()).is_err() {
                        // Caller went away before learning its id.
                        self.unregister(&subscription);
                    }
                }

                HubCommand::Unregister { subscription } => self.unregister(&subscription),

                HubCommand::Broadcast { measurement } => self.broadcast(&measurement),

                HubCommand::SubscriberCount {
                    check_id,
                    respond_to,
                } => {
                    let count = self.subscribers.get(&check_id).map_or(0, Vec::len);
                    let _ = respond_to.send(count);
                }

                HubCommand::GetStats { respond_to } => {
                    let _ = respond_to.send(self.stats());
                }

                HubCommand::Shutdown => {
                    debug!("received shutdown command");
                    break;
                }
            }
        }

        debug!(
            "hub stopped, releasing {} subscribers",
            self.stats().subscribers
        );
    }

    fn register(&mut self, check_id: String, sink: Box<dyn SubscriberSink>) -> Subscription {
        let id = self.next_id;
        self.next_id += 1;

        debug!("subscriber {id} registered for check {check_id}");

        self.subscribers
            .entry(check_id.clone())
            .or_default()
            .push(Subscriber { id, sink });

        Subscription { id, check_id }
    }

    fn unregister(&mut self, subscription: &Subscription) {
        let Some(subscribers) = self.subscribers.get_mut(&subscription.check_id) else {
            trace!("unregister of unknown subscriber {}", subscription.id);
            return;
        };

        subscribers.retain(|s| s.id != subscription.id);
        if subscribers.is_empty() {
            self.subscribers.remove(&subscription.check_id);
        }

        debug!(
            "subscriber {} unregistered from check {}",
            subscription.id, subscription.check_id
        );
    }

    fn broadcast(&mut self, measurement: &Measurement) {
        let check_id = measurement.check_id();

        let Some(subscribers) = self.subscribers.get_mut(check_id) else {
            trace!("no subscribers for check {check_id}");
            return;
        };

        let start = Instant::now();

        let payload: Arc<str> = match codec::to_json(measurement) {
            Ok(json) => json.into(),
            Err(e) => {
                error!("failed to serialize measurement {}: {e}", measurement.id);
                return;
            }
        };

        let before = subscribers.len();
        subscribers.retain(|subscriber| match subscriber.sink.deliver(payload.clone()) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "dropping subscriber {} of check {check_id}: {e}",
                    subscriber.id
                );
                false
            }
        });
        let remaining = subscribers.len();

        if remaining == 0 {
            self.subscribers.remove(check_id);
        }

        self.delivered += remaining as u64;
        self.dropped += (before - remaining) as u64;
        self.telemetry.record(BROADCAST_TIMER, start.elapsed());

        trace!("broadcast for check {check_id} reached {remaining} subscribers");
    }

    fn stats(&self) -> HubStats {
        HubStats {
            checks: self.subscribers.len(),
            subscribers: self.subscribers.values().map(Vec::len).sum(),
            delivered: self.delivered,
            dropped: self.dropped,
        }
    }
}

/// Handle for talking to the HubActor
///
/// Cheap to clone. Every method enqueues one request on the hub's queue.
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Spawn the hub with a request queue of `capacity`
    pub fn spawn(capacity: usize, telemetry: Telemetry) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(capacity);

        let actor = HubActor::new(cmd_rx, telemetry);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Register `sink` for `check_id`
    pub async fn register(
        &self,
        check_id: impl Into<String>,
        sink: impl SubscriberSink,
    ) -> Result<Subscription> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HubCommand::Register {
                check_id: check_id.into(),
                sink: Box::new(sink),
                respond_to: tx,
            })
            .await
            .context("failed to send Register command")?;

        rx.await.context("failed to receive subscription")
    }

    /// Register a channel-backed subscriber holding up to `buffer` payloads
    pub async fn subscribe(
        &self,
        check_id: impl Into<String>,
        buffer: usize,
    ) -> Result<(Subscription, mpsc::Receiver<Arc<str>>)> {
        let (tx, rx) = mpsc::channel(buffer);
        let subscription = self.register(check_id, tx).await?;
        Ok((subscription, rx))
    }

    pub async fn unregister(&self, subscription: Subscription) -> Result<()> {
        self.sender
            .send(HubCommand::Unregister { subscription })
            .await
            .context("failed to send Unregister command")
    }

    pub async fn broadcast(&self, measurement: Measurement) -> Result<()> {
        self.sender
            .send(HubCommand::Broadcast { measurement })
            .await
            .context("failed to send Broadcast command")
    }

    pub async fn subscriber_count(&self, check_id: impl Into<String>) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HubCommand::SubscriberCount {
                check_id: check_id.into(),
                respond_to: tx,
            })
            .await
            .context("failed to send SubscriberCount command")?;

        rx.await.context("failed to receive subscriber count")
    }

    pub async fn get_stats(&self) -> Option<HubStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HubCommand::GetStats { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(HubCommand::Shutdown).await;
    }
}
