//! SQLite persistence tests
//!
//! These tests verify that:
//! - The full pipeline works on the SQLite backend
//! - Recorded measurements survive a restart
//! - Retention trimming applies to persisted data

use std::sync::Arc;

use canaryd::storage::{MeasurementStore, ScoreRange, sqlite::SqliteStore};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::helpers::*;

#[tokio::test]
async fn test_pipeline_on_sqlite() {
    let dir = tempdir().unwrap();
    let store = Arc::new(SqliteStore::new(dir.path().join("canaryd.db")).await.unwrap());
    let daemon = TestDaemon::start(store, 1010, 60);

    daemon.pipeline.dispatch(measurement("FOO", 1000)).await.unwrap();
    daemon.pipeline.dispatch(measurement("FOO", 1005)).await.unwrap();
    daemon.wait_recorded(2).await;

    let result = daemon.query.get_range("FOO", 60).await.unwrap();
    assert_eq!(result, vec![measurement("FOO", 1005), measurement("FOO", 1000)]);

    daemon.stop().await;
}

#[tokio::test]
async fn test_measurements_survive_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("canaryd.db");

    {
        let store = Arc::new(SqliteStore::new(&db_path).await.unwrap());
        let daemon = TestDaemon::start(store.clone(), 1000, 60);

        daemon.pipeline.dispatch(measurement("FOO", 1000)).await.unwrap();
        daemon.wait_recorded(1).await;
        daemon.stop().await;

        store.close().await.unwrap();
    }

    let store = Arc::new(SqliteStore::new(&db_path).await.unwrap());
    let daemon = TestDaemon::start(store, 1030, 60);

    let result = daemon.query.get_range("FOO", 60).await.unwrap();
    assert_eq!(result, vec![measurement("FOO", 1000)]);

    daemon.stop().await;
}

#[tokio::test]
async fn test_retention_on_sqlite() {
    let dir = tempdir().unwrap();
    let store = Arc::new(SqliteStore::new(dir.path().join("canaryd.db")).await.unwrap());
    let daemon = TestDaemon::start(store.clone(), 1000, 60);

    daemon.pipeline.dispatch(measurement("FOO", 1000)).await.unwrap();
    daemon.pipeline.dispatch(measurement("BAR", 1000)).await.unwrap();
    daemon.wait_recorded(2).await;

    daemon.clock.set(5000);
    daemon.pipeline.dispatch(measurement("FOO", 5000)).await.unwrap();
    daemon.wait_recorded(3).await;

    let foo = store
        .range_query("measurements:FOO", ScoreRange::all())
        .await
        .unwrap();
    assert_eq!(foo.len(), 1);

    // Only the written check is trimmed.
    let bar = store
        .range_query("measurements:BAR", ScoreRange::all())
        .await
        .unwrap();
    assert_eq!(bar.len(), 1);

    daemon.stop().await;
}
