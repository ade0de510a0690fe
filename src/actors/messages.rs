//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to specific actors via mpsc
//! 2. **Replies**: oneshot channels carried inside the command
//! 3. **Ordering**: every actor handles its queue strictly in receipt order

use serde::Serialize;
use tokio::sync::oneshot;

use super::hub::{SubscriberSink, Subscription};
use crate::Measurement;

/// Requests handled by the hub's control loop
///
/// Registration, removal and broadcast all travel through this one queue, so
/// the subscriber registry is only ever touched by the loop that owns it.
#[derive(Debug)]
pub enum HubCommand {
    /// Add a subscriber for `check_id`
    Register {
        check_id: String,
        sink: Box<dyn SubscriberSink>,
        respond_to: oneshot::Sender<Subscription>,
    },

    /// Remove a subscriber. Unknown subscriptions are ignored.
    Unregister { subscription: Subscription },

    /// Deliver a measurement to every subscriber of its check
    Broadcast { measurement: Measurement },

    /// Number of subscribers currently registered for `check_id`
    SubscriberCount {
        check_id: String,
        respond_to: oneshot::Sender<usize>,
    },

    GetStats {
        respond_to: oneshot::Sender<HubStats>,
    },

    /// Stop the loop. Dropping the registry closes every subscriber sink.
    Shutdown,
}

/// Hub statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HubStats {
    /// Checks with at least one subscriber
    pub checks: usize,

    /// Registered subscribers across all checks
    pub subscribers: usize,

    /// Successful deliveries
    pub delivered: u64,

    /// Subscribers removed after a failed delivery
    pub dropped: u64,
}

/// Commands that can be sent to the RecorderActor
#[derive(Debug)]
pub enum RecorderCommand {
    GetStats {
        respond_to: oneshot::Sender<RecorderStats>,
    },

    /// Record everything already queued, then stop
    Shutdown,
}

/// Recorder statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecorderStats {
    /// Measurements appended to the store
    pub recorded: u64,

    /// Members removed by retention trims
    pub trimmed: u64,
}

/// Commands that can be sent to an ingestion listener
#[derive(Debug)]
pub enum ListenerCommand {
    Shutdown,
}

/// Commands that can be sent to the MetricsReporter
#[derive(Debug)]
pub enum ReporterCommand {
    /// Export immediately instead of waiting for the next tick
    FlushNow { respond_to: oneshot::Sender<()> },

    Shutdown,
}
