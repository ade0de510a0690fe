//! Failure scenario tests
//!
//! These tests verify that:
//! - A store write failure stops the recorder with an error
//! - A failing subscriber is removed without affecting others
//! - Sensor streams recover from HTTP errors and corrupt bodies
//! - Read failures surface as request errors without stopping ingestion

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use canaryd::{
    actors::{
        hub::{DeliveryError, SubscriberSink},
        pipeline::PipelineError,
        recorder::RecorderError,
        sensor::SensorHandle,
    },
    storage::{
        HealthStatus, MeasurementStore, MemoryStore, ScoreRange, StorageError, StorageResult,
    },
    telemetry::DECODE_ERRORS,
};
use tokio::time::timeout;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

/// Store wrapper whose writes or reads can be switched off
#[derive(Default)]
struct UnreliableStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    fail_trims: AtomicBool,
}

#[async_trait]
impl MeasurementStore for UnreliableStore {
    async fn append(&self, key: &str, score: i64, payload: &str) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed("store unreachable".to_string()));
        }
        self.inner.append(key, score, payload).await
    }

    async fn range_query(&self, key: &str, range: ScoreRange) -> StorageResult<Vec<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::ReadFailed("store unreachable".to_string()));
        }
        self.inner.range_query(key, range).await
    }

    async fn trim_below(&self, key: &str, threshold: i64) -> StorageResult<usize> {
        if self.fail_trims.load(Ordering::SeqCst) {
            return Err(StorageError::TrimFailed("store unreachable".to_string()));
        }
        self.inner.trim_below(key, threshold).await
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        self.inner.health_check().await
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_store_write_failure_stops_recorder() {
    let store = Arc::new(UnreliableStore::default());
    let daemon = TestDaemon::start(store.clone(), 1000, 60);

    daemon.pipeline.dispatch(measurement("FOO", 1000)).await.unwrap();
    daemon.wait_recorded(1).await;

    store.fail_writes.store(true, Ordering::SeqCst);
    daemon.pipeline.dispatch(measurement("FOO", 1001)).await.unwrap();

    let result = timeout(Duration::from_secs(2), daemon.recorder_task)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(
        result,
        Err(RecorderError::Store(StorageError::WriteFailed(_)))
    ));

    // The recorder queue is gone, so producers see the outage.
    assert!(daemon.pipeline.dispatch(measurement("FOO", 1002)).await.is_err());
}

#[tokio::test]
async fn test_store_trim_failure_stops_recorder() {
    let store = Arc::new(UnreliableStore::default());
    let daemon = TestDaemon::start(store.clone(), 1000, 60);

    store.fail_trims.store(true, Ordering::SeqCst);
    daemon.pipeline.dispatch(measurement("FOO", 1000)).await.unwrap();

    let result = timeout(Duration::from_secs(2), daemon.recorder_task)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(
        result,
        Err(RecorderError::Store(StorageError::TrimFailed(_)))
    ));
    assert!(matches!(
        daemon.pipeline.dispatch(measurement("FOO", 1001)).await,
        Err(PipelineError::RecorderClosed)
    ));
}

#[tokio::test]
async fn test_bulk_post_after_recorder_stops_is_unavailable() {
    let store = Arc::new(UnreliableStore::default());
    let daemon = TestDaemon::start(store.clone(), 1000, 60);
    let addr = daemon.serve().await;

    store.fail_writes.store(true, Ordering::SeqCst);
    daemon.pipeline.dispatch(measurement("FOO", 1000)).await.unwrap();
    timeout(Duration::from_secs(2), daemon.recorder_task)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();

    let body = serde_json::json!([{"not": "a measurement"}, measurement_json("FOO", 1001)]);
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/measurements"))
        .json(&body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    let json: serde_json::Value = response.json().await.unwrap();
    assert!(
        json["error"]
            .as_str()
            .unwrap()
            .contains("after accepting 0 measurements")
    );
}

#[tokio::test]
async fn test_read_failure_is_a_request_error() {
    let store = Arc::new(UnreliableStore::default());
    let daemon = TestDaemon::start(store.clone(), 1000, 60);
    let addr = daemon.serve().await;

    store.fail_reads.store(true, Ordering::SeqCst);

    let response = reqwest::get(format!("http://{addr}/checks/FOO/measurements"))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let json: serde_json::Value = response.json().await.unwrap();
    assert!(json["error"].as_str().unwrap().contains("unreachable"));

    // Ingestion is unaffected.
    daemon.pipeline.dispatch(measurement("FOO", 1000)).await.unwrap();
    daemon.wait_recorded(1).await;

    store.fail_reads.store(false, Ordering::SeqCst);
    assert_eq!(daemon.query.get_range("FOO", 60).await.unwrap().len(), 1);

    daemon.stop().await;
}

#[derive(Debug, Clone, Default)]
struct SwitchableSink {
    fail: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl SubscriberSink for SwitchableSink {
    fn deliver(&self, _payload: Arc<str>) -> Result<(), DeliveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            Err(DeliveryError::Closed)
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn test_failed_subscriber_is_not_invoked_again() {
    let daemon = TestDaemon::in_memory(1000, 60);

    let failing = SwitchableSink::default();
    let healthy = SwitchableSink::default();
    daemon.hub.register("FOO", failing.clone()).await.unwrap();
    daemon.hub.register("FOO", healthy.clone()).await.unwrap();

    daemon.pipeline.dispatch(measurement("FOO", 1000)).await.unwrap();
    failing.fail.store(true, Ordering::SeqCst);
    daemon.pipeline.dispatch(measurement("FOO", 1001)).await.unwrap();
    daemon.pipeline.dispatch(measurement("FOO", 1002)).await.unwrap();

    assert_eq!(daemon.hub.subscriber_count("FOO").await.unwrap(), 1);
    assert_eq!(failing.calls.load(Ordering::SeqCst), 2);
    assert_eq!(healthy.calls.load(Ordering::SeqCst), 3);

    // The broadcaster never saw an error and everything was recorded.
    daemon.wait_recorded(3).await;

    daemon.stop().await;
}

#[tokio::test]
async fn test_sensor_recovers_after_http_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    let body = [measurement_json("FOO", 995), measurement_json("FOO", 996)]
        .iter()
        .map(|value| value.to_string())
        .collect::<String>();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let daemon = TestDaemon::in_memory(1000, 60);
    let sensor = SensorHandle::spawn(
        mock_server.uri(),
        daemon.pipeline.clone(),
        Duration::from_millis(10),
    )
    .unwrap();

    daemon.wait_recorded(2).await;

    let times: Vec<i64> = daemon
        .query
        .get_range("FOO", 60)
        .await
        .unwrap()
        .iter()
        .map(|m| m.t)
        .collect();
    assert_eq!(times, vec![996, 995]);
    assert_eq!(daemon.telemetry.counter(DECODE_ERRORS), 0);

    sensor.shutdown().await.unwrap();
    daemon.stop().await;
}

#[tokio::test]
async fn test_sensor_corrupt_stream_is_counted() {
    let mock_server = MockServer::start().await;

    let body = format!("{}[[[oops", measurement_json("FOO", 990));
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(measurement_json("FOO", 991).to_string()))
        .mount(&mock_server)
        .await;

    let daemon = TestDaemon::in_memory(1000, 60);
    let sensor = SensorHandle::spawn(
        mock_server.uri(),
        daemon.pipeline.clone(),
        Duration::from_millis(10),
    )
    .unwrap();

    daemon.wait_recorded(2).await;

    let stored = daemon.query.get_range("FOO", 60).await.unwrap();
    assert!(stored.iter().any(|m| m.t == 990));
    assert!(stored.iter().any(|m| m.t == 991));
    assert_eq!(daemon.telemetry.counter(DECODE_ERRORS), 1);

    sensor.shutdown().await.unwrap();
    daemon.stop().await;
}
