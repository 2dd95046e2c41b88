//! Process wiring: load configuration, construct every collaborator the job pipeline needs,
//! and run the download worker, both upload stream workers, the queued-job dispatcher, and the
//! health monitor side by side until shutdown.

use std::sync::Arc;
use std::time::Duration;

use redis::Client as RedisClient;
use redis::aio::ConnectionManager;
use reqwest::Client as HttpClient;
use revaer_coordination::{Cache, LockManager, StreamDispatcher, StreamWorker};
use revaer_data::DataStore;
use revaer_download::{DownloadContext, SimulatedEngine, UploadTrigger};
use revaer_events::EventBus;
use revaer_health::HealthMonitor;
use revaer_jobs_core::ProviderType;
use revaer_telemetry::{GlobalContextGuard, LoggingConfig, Metrics, OpenTelemetryConfig};
use revaer_upload_gdrive::GDriveExecutor;
use revaer_upload_s3::S3Executor;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::health_server;
use crate::processors::{GDriveJobProcessor, S3JobProcessor};
use crate::queue_dispatch;
use crate::request_file_resolver::HttpRequestFileResolver;
use crate::runner::JobBackgroundEngine;

/// Entry point for the application's boot sequence.
///
/// # Errors
///
/// Returns an error if configuration, telemetry, or any of the storage/queue collaborators
/// fail to initialize.
pub async fn run_app() -> AppResult<()> {
    let config = revaer_config::load()?;

    let logging = LoggingConfig::default();
    let otel = config.telemetry.otel_enabled.then(|| OpenTelemetryConfig {
        enabled: true,
        service_name: std::borrow::Cow::Owned(config.telemetry.otel_service_name.clone()),
        endpoint: config.telemetry.otel_exporter.clone().map(std::borrow::Cow::Owned),
    });
    let _otel_guard = revaer_telemetry::init_logging_with_otel(&logging, otel.as_ref())
        .map_err(AppError::Telemetry)?;
    let _context = GlobalContextGuard::new("bootstrap");
    let metrics = Metrics::new().map_err(AppError::Runtime)?;

    info!("revaer-app bootstrap starting");

    let pool = PgPoolOptions::new()
        .max_connections(16)
        .connect(&config.database_url)
        .await
        .map_err(AppError::Pool)?;
    let store = DataStore::new(pool).await?;

    let redis_client = RedisClient::open(config.redis_connection_string.clone())?;
    let redis = ConnectionManager::new(redis_client).await?;

    let locks = LockManager::new(redis.clone());
    let cache = Cache::new(redis.clone());
    let http_client = HttpClient::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|err| AppError::Runtime(err.into()))?;

    let resolver = Arc::new(HttpRequestFileResolver::new(
        http_client.clone(),
        config.request_file_service_base_url.clone(),
    ));
    let torrent_engine = Arc::new(SimulatedEngine::new());

    let gdrive_dispatcher = StreamDispatcher::<UploadTrigger>::new(
        redis.clone(),
        ProviderType::GoogleDrive.stream_key(),
        ProviderType::GoogleDrive.consumer_group(),
    );
    let s3_dispatcher = StreamDispatcher::<UploadTrigger>::new(
        redis.clone(),
        ProviderType::S3.stream_key(),
        ProviderType::S3.consumer_group(),
    );

    let download = Arc::new(
        DownloadContext::new(
            store.clone(),
            torrent_engine,
            resolver,
            gdrive_dispatcher,
            s3_dispatcher,
            config.torrent_download_path.clone(),
        )
        .with_metrics(metrics.clone()),
    );

    let gdrive_executor = Arc::new(
        GDriveExecutor::new(store.clone(), locks.clone(), cache, http_client.clone(), config.job_upload_torrent_files)
            .with_metrics(metrics.clone()),
    );
    let s3_executor = Arc::new(
        S3Executor::new(store.clone(), locks, http_client, config.job_upload_torrent_files).with_metrics(metrics.clone()),
    );

    let engine: Arc<JobBackgroundEngine> = Arc::new(JobBackgroundEngine::new(
        store.clone(),
        Arc::clone(&download),
        Arc::clone(&gdrive_executor),
        Arc::clone(&s3_executor),
    ));

    let events = EventBus::new();
    let health = HealthMonitor::new(store.clone(), engine.clone())
        .with_cadence(config.job_health_check_interval, config.job_health_stale_threshold)
        .with_events(events.clone())
        .with_metrics(metrics.clone());

    let consumer = format!("revaer-app-{}", std::process::id());
    let gdrive_worker = StreamWorker::new(
        redis.clone(),
        ProviderType::GoogleDrive.stream_key(),
        ProviderType::GoogleDrive.consumer_group(),
        consumer.clone(),
        GDriveJobProcessor::new(store.clone(), gdrive_executor),
    );
    let s3_worker = StreamWorker::new(
        redis,
        ProviderType::S3.stream_key(),
        ProviderType::S3.consumer_group(),
        consumer,
        S3JobProcessor::new(store.clone(), s3_executor),
    );

    let cancel = CancellationToken::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let health_server_task =
        tokio::spawn(health_server::run(config.health_bind_addr, cancel.clone(), metrics.clone()));
    let health_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { revaer_health::run(&health, &cancel).await }
    });
    let dispatch_task = tokio::spawn({
        let cancel = cancel.clone();
        let store = store.clone();
        let engine = engine;
        let metrics = metrics.clone();
        async move { queue_dispatch::run(&store, engine.as_ref(), queue_dispatch::DEFAULT_POLL_INTERVAL, &cancel, Some(&metrics)).await }
    });
    let gdrive_task = tokio::spawn({
        let shutdown = shutdown_rx.clone();
        async move { gdrive_worker.run(shutdown).await }
    });
    let s3_task = tokio::spawn(async move { s3_worker.run(shutdown_rx).await });

    tokio::signal::ctrl_c().await.map_err(|err| AppError::Runtime(err.into()))?;
    info!("shutdown signal received, stopping workers");

    cancel.cancel();
    let _ = shutdown_tx.send(true);

    health_task.await.map_err(|err| AppError::Runtime(err.into()))?;
    dispatch_task.await.map_err(|err| AppError::Runtime(err.into()))?;
    if let Err(err) = gdrive_task.await.map_err(|err| AppError::Runtime(err.into()))? {
        warn!(error = %err, "gdrive stream worker exited with an error");
    }
    if let Err(err) = s3_task.await.map_err(|err| AppError::Runtime(err.into()))? {
        warn!(error = %err, "s3 stream worker exited with an error");
    }
    if let Err(err) = health_server_task.await.map_err(|err| AppError::Runtime(err.into()))? {
        warn!(error = %err, "health endpoint exited with an error");
    }

    info!("revaer-app shutdown complete");
    Ok(())
}
