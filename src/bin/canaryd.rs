use std::sync::Arc;

use anyhow::Context;
use canaryd::{
    actors::{
        datagram::DatagramHandle, hub::HubHandle, pipeline::Pipeline, recorder::Recorder,
        recorder::RecorderHandle, reporter::ReporterHandle, sensor::SensorHandle,
    },
    api::{ApiConfig, ApiState, spawn_api_server},
    clock::{Clock, SystemClock},
    config::{Args, Config},
    query::QueryService,
    storage,
    telemetry::{
        Telemetry,
        sink::{LibratoSink, LogSink, MetricsSink},
    },
};
use clap::Parser;
use tracing::{error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

fn init(log_level: &str) {
    let level = log_level.parse().unwrap_or_else(|_| {
        eprintln!("unknown log level {log_level:?}, using info");
        LevelFilter::INFO
    });

    let filter = filter::Targets::new().with_targets(vec![
        ("canaryd", level),
        ("tower_http", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();
    init(&args.log_level);
    trace!("started with args: {args:?}");

    let config = Config::load(&args)?;

    let store = storage::open(&config.storage)
        .await
        .context("failed to open measurement store")?;
    let telemetry = Telemetry::new();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let hub = HubHandle::spawn(config.hub_queue, telemetry.clone());

    let recorder = Recorder::new(
        store.clone(),
        clock.clone(),
        config.retention_secs,
        &config.key_prefix,
        telemetry.clone(),
    );
    let (recorder_handle, mut recorder_task) =
        RecorderHandle::spawn(recorder, config.recorder_queue);

    let pipeline = Pipeline::new(
        recorder_handle.measurement_sender(),
        hub.clone(),
        telemetry.clone(),
    );

    let sensors = config
        .sensord_urls
        .iter()
        .map(|url| SensorHandle::spawn(url.clone(), pipeline.clone(), config.ingest_retry()))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let datagram = match config.udp_bind {
        Some(addr) => Some(DatagramHandle::bind(addr, pipeline.clone(), config.ingest_retry()).await?),
        None => None,
    };

    let mut sinks: Vec<Box<dyn MetricsSink>> = vec![Box::new(LogSink)];
    if let Some(librato) = config.librato.clone() {
        info!("exporting metrics to librato as {}", librato.source);
        sinks.push(Box::new(LibratoSink::new(librato)?));
    }
    let reporter = ReporterHandle::spawn(telemetry.clone(), sinks, config.metrics_interval());

    let state = ApiState {
        query: QueryService::new(store.clone(), clock, &config.key_prefix, telemetry.clone()),
        pipeline,
        hub: hub.clone(),
        recorder: recorder_handle.clone(),
        telemetry,
        subscriber_buffer: config.subscriber_buffer,
    };
    spawn_api_server(
        ApiConfig {
            bind_addr: config.http_addr(),
            enable_cors: true,
        },
        state,
    )
    .await?;

    info!(
        "canaryd ready: {} sensors, retention {}s",
        sensors.len(),
        config.retention_secs
    );

    tokio::select! {
        result = &mut recorder_task => {
            match result {
                Ok(Ok(())) => error!("recorder stopped unexpectedly"),
                Ok(Err(e)) => error!("recorder failed, exiting: {e}"),
                Err(e) => error!("recorder task failed: {e}"),
            }
            std::process::exit(1);
        }

        _ = tokio::signal::ctrl_c() => {
            info!("received interrupt, shutting down");
        }
    }

    for sensor in &sensors {
        if let Err(e) = sensor.shutdown().await {
            warn!("sensor {} did not stop cleanly: {e:#}", sensor.url);
        }
    }
    if let Some(datagram) = &datagram {
        let _ = datagram.shutdown().await;
    }

    recorder_handle.shutdown().await?;
    match recorder_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("recorder failed while draining: {e}");
            std::process::exit(1);
        }
        Err(e) => error!("recorder task failed: {e}"),
    }

    hub.shutdown().await;
    let _ = reporter.shutdown().await;
    store.close().await?;

    info!("stopped");
    Ok(())
}
