//! Helper functions for integration tests
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use canaryd::{
    Check, Measurement,
    actors::{
        hub::HubHandle,
        pipeline::Pipeline,
        recorder::{Recorder, RecorderError, RecorderHandle},
    },
    api::{ApiConfig, ApiState, spawn_api_server},
    clock::ManualClock,
    query::QueryService,
    storage::MeasurementStore,
    telemetry::Telemetry,
};
use tokio::task::JoinHandle;
use tokio::time::timeout;

pub const PREFIX: &str = "measurements";

/// Everything the binary wires together, on a pinned clock
pub struct TestDaemon {
    pub store: Arc<dyn MeasurementStore>,
    pub clock: Arc<ManualClock>,
    pub telemetry: Telemetry,
    pub hub: HubHandle,
    pub recorder: RecorderHandle,
    pub recorder_task: JoinHandle<Result<(), RecorderError>>,
    pub pipeline: Pipeline,
    pub query: QueryService,
}

impl TestDaemon {
    pub fn start(store: Arc<dyn MeasurementStore>, now: i64, retention: i64) -> Self {
        let clock = Arc::new(ManualClock::new(now));
        let telemetry = Telemetry::new();

        let hub = HubHandle::spawn(64, telemetry.clone());
        let recorder = Recorder::new(
            store.clone(),
            clock.clone(),
            retention,
            PREFIX,
            telemetry.clone(),
        );
        let (recorder, recorder_task) = RecorderHandle::spawn(recorder, 64);
        let pipeline = Pipeline::new(recorder.measurement_sender(), hub.clone(), telemetry.clone());
        let query = QueryService::new(store.clone(), clock.clone(), PREFIX, telemetry.clone());

        Self {
            store,
            clock,
            telemetry,
            hub,
            recorder,
            recorder_task,
            pipeline,
            query,
        }
    }

    pub fn in_memory(now: i64, retention: i64) -> Self {
        Self::start(Arc::new(canaryd::storage::MemoryStore::new()), now, retention)
    }

    pub fn api_state(&self) -> ApiState {
        ApiState {
            query: self.query.clone(),
            pipeline: self.pipeline.clone(),
            hub: self.hub.clone(),
            recorder: self.recorder.clone(),
            telemetry: self.telemetry.clone(),
            subscriber_buffer: 16,
        }
    }

    /// Serve the HTTP API on a random local port
    pub async fn serve(&self) -> SocketAddr {
        let config = ApiConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            enable_cors: true,
        };
        spawn_api_server(config, self.api_state()).await.unwrap()
    }

    /// Wait until the recorder has stored `count` measurements in total
    pub async fn wait_recorded(&self, count: u64) {
        timeout(Duration::from_secs(5), async {
            loop {
                let stats = self.recorder.get_stats().await.unwrap();
                if stats.recorded >= count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("recorder did not catch up in time");
    }

    pub async fn stop(self) {
        self.recorder.shutdown().await.unwrap();
        self.recorder_task.await.unwrap().unwrap();
        self.hub.shutdown().await;
    }
}

pub fn measurement(check_id: &str, t: i64) -> Measurement {
    Measurement {
        check: Check {
            id: check_id.to_string(),
            url: format!("https://{}.example.com/", check_id.to_lowercase()),
        },
        id: format!("{check_id}-{t}"),
        location: "test-location".to_string(),
        t,
        exit_status: 0,
        http_status: Some(200),
        total_time: Some(0.125),
        ..Default::default()
    }
}

pub fn measurement_json(check_id: &str, t: i64) -> serde_json::Value {
    serde_json::to_value(measurement(check_id, t)).unwrap()
}
