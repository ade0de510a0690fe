//! Actor-based ingestion, persistence and fan-out
//!
//! Each actor runs as an independent tokio task and is only reachable through
//! its handle. Actors talk to each other exclusively through bounded queues.
//!
//! ## Architecture Overview
//!
//! ```text
//!   SensorActor (per URL) ─┐
//!   DatagramActor ─────────┼──► Pipeline ──► RecorderActor ──► MeasurementStore
//!   POST /measurements ────┘        │                               ▲
//!                                   └──────► HubActor               │
//!                                              │           QueryService
//!                                              ▼                    ▲
//!                                  stream subscribers     GET .../measurements
//!
//!   ReporterActor ──► Telemetry snapshot ──► MetricsSinks
//! ```
//!
//! ## Actor Types
//!
//! - **SensorActor**: Streams concatenated JSON measurements from a sensor URL
//! - **DatagramActor**: Receives one protobuf measurement per UDP datagram
//! - **RecorderActor**: Appends to the store and trims to the retention window
//! - **HubActor**: Owns the subscriber registry and fans measurements out
//! - **ReporterActor**: Periodically exports timers and counters
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Data**: Measurements travel over bounded mpsc queues; a full queue
//!    makes the producer wait
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod datagram;
pub mod hub;
pub mod messages;
pub mod pipeline;
pub mod recorder;
pub mod reporter;
pub mod sensor;
