//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - Health and stats endpoints respond without touching the store
//! - Range queries honor the window, the default and parameter validation
//! - Bulk ingest dispatches to the recorder and the hub
//! - WebSocket streams deliver live measurements of one check

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use canaryd::{Measurement, api::router, codec};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tower::ServiceExt;

use crate::helpers::*;

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let daemon = TestDaemon::in_memory(1000, 60);

    let response = router(daemon.api_state())
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"OK\n");

    daemon.stop().await;
}

#[tokio::test]
async fn test_invalid_range_is_bad_request() {
    let daemon = TestDaemon::in_memory(1000, 60);
    let app = router(daemon.api_state());

    for uri in [
        "/checks/FOO/measurements?range=abc",
        "/checks/FOO/measurements?range=-5",
        "/checks/FOO/measurements?range=2.5",
    ] {
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].is_string(), "{uri}");
    }

    daemon.stop().await;
}

#[tokio::test]
async fn test_range_query_over_http() {
    let daemon = TestDaemon::in_memory(1010, 600);
    for t in [900, 1000, 1005] {
        daemon.pipeline.dispatch(measurement("FOO", t)).await.unwrap();
    }
    daemon.wait_recorded(3).await;

    let addr = daemon.serve().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{addr}/checks/FOO/measurements?range=60"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let measurements: Vec<Measurement> = response.json().await.unwrap();
    assert_eq!(
        measurements,
        vec![measurement("FOO", 1005), measurement("FOO", 1000)]
    );

    // Default window is ten seconds.
    let measurements: Vec<Measurement> = client
        .get(format!("http://{addr}/checks/FOO/measurements"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(measurements, vec![measurement("FOO", 1005), measurement("FOO", 1000)]);

    daemon.clock.set(1014);
    let measurements: Vec<Measurement> = client
        .get(format!("http://{addr}/checks/FOO/measurements"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(measurements, vec![measurement("FOO", 1005)]);

    daemon.stop().await;
}

#[tokio::test]
async fn test_unknown_check_returns_empty_array() {
    let daemon = TestDaemon::in_memory(1000, 60);
    let addr = daemon.serve().await;

    let response = reqwest::get(format!("http://{addr}/checks/NOPE/measurements?range=60"))
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json, json!([]));

    daemon.stop().await;
}

#[tokio::test]
async fn test_bulk_post_records_measurements() {
    let daemon = TestDaemon::in_memory(1000, 60);
    let addr = daemon.serve().await;

    let body = json!([
        measurement_json("FOO", 998),
        {"not": "a measurement"},
        measurement_json("FOO", 999),
    ]);

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/measurements"))
        .json(&body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json, json!({"accepted": 2, "rejected": 1}));

    daemon.wait_recorded(2).await;
    let stored = daemon.query.get_range("FOO", 60).await.unwrap();
    assert_eq!(stored, vec![measurement("FOO", 999), measurement("FOO", 998)]);

    daemon.stop().await;
}

#[tokio::test]
async fn test_bulk_post_rejects_non_array() {
    let daemon = TestDaemon::in_memory(1000, 60);

    let response = router(daemon.api_state())
        .oneshot(
            Request::post("/measurements")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"check": {"id": "FOO"}, "t": 1}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    daemon.stop().await;
}

#[tokio::test]
async fn test_stats_endpoint() {
    let daemon = TestDaemon::in_memory(1000, 60);
    daemon.pipeline.dispatch(measurement("FOO", 1000)).await.unwrap();
    daemon.wait_recorded(1).await;

    let addr = daemon.serve().await;
    let json: Value = reqwest::get(format!("http://{addr}/stats"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert!(json["timestamp"].is_string());
    assert_eq!(json["counters"]["canaryd.ingested"], 1);
    assert_eq!(json["timers"]["canaryd.record"]["count"], 1);
    assert_eq!(json["recorder"]["recorded"], 1);
    assert_eq!(json["hub"]["subscribers"], 0);

    daemon.stop().await;
}

#[tokio::test]
async fn test_websocket_streams_live_measurements() {
    let daemon = TestDaemon::in_memory(1000, 60);
    let addr = daemon.serve().await;

    let (mut socket, _) = connect_async(format!("ws://{addr}/checks/FOO/stream"))
        .await
        .unwrap();

    // Registered before the handshake completed.
    assert_eq!(daemon.hub.subscriber_count("FOO").await.unwrap(), 1);

    daemon.pipeline.dispatch(measurement("BAR", 1000)).await.unwrap();
    daemon.pipeline.dispatch(measurement("FOO", 1001)).await.unwrap();
    daemon.pipeline.dispatch(measurement("FOO", 1002)).await.unwrap();

    for expected in [1001, 1002] {
        let message = timeout(Duration::from_secs(2), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let Message::Text(text) = message else {
            panic!("expected a text message, got {message:?}");
        };
        assert_eq!(codec::from_json(&text).unwrap(), measurement("FOO", expected));
    }

    socket.close(None).await.unwrap();

    timeout(Duration::from_secs(2), async {
        while daemon.hub.subscriber_count("FOO").await.unwrap() != 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscriber was not unregistered after close");

    daemon.stop().await;
}
