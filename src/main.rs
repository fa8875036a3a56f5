use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use momo_gateway::api::{self, AppState};
use momo_gateway::config::AppConfig;
use momo_gateway::database::{init_pool_from_config, WebhookEventRepository};
use momo_gateway::health::HealthChecker;
use momo_gateway::logging::init_tracing;
use momo_gateway::providers::ProviderRegistry;
use momo_gateway::services::{PaymentGateway, ReconciliationEngine, WebhookIngest};
use momo_gateway::tracker::TransactionTracker;
use momo_gateway::workers::{
    ReconciliationSweepConfig, ReconciliationSweepWorker, RetrySchedulerConfig,
    RetrySchedulerWorker, WebhookReplayWorker,
};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        "🚀 Starting mobile money gateway"
    );

    let config = AppConfig::from_env().map_err(|e| {
        error!("❌ Failed to load configuration: {}", e);
        anyhow::anyhow!(e.to_string())
    })?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    info!(
        host = %config.server.host,
        port = config.server.port,
        "Server configuration loaded"
    );

    // Database connection pool
    info!("📊 Initializing database connection pool...");
    let db_pool = init_pool_from_config(&config.database).await.map_err(|e| {
        error!("Failed to initialize database pool: {}", e);
        e
    })?;
    info!(
        max_connections = db_pool.options().get_max_connections(),
        "✅ Database connection pool initialized"
    );

    // Provider adapters, one per configured network
    info!("📡 Initializing provider adapters...");
    let registry = Arc::new(ProviderRegistry::from_env().map_err(|e| {
        error!("❌ Failed to initialize provider adapters: {}", e);
        anyhow::anyhow!(e.to_string())
    })?);
    info!(providers = ?registry.configured(), "✅ Provider adapters ready");

    // Core services
    let tracker = Arc::new(TransactionTracker::new(db_pool.clone()));
    let gateway = Arc::new(PaymentGateway::new(tracker.clone(), registry.clone()));
    let engine = Arc::new(ReconciliationEngine::new(tracker.clone(), registry.clone()));
    let ingest = Arc::new(WebhookIngest::new(
        registry.clone(),
        WebhookEventRepository::new(db_pool.clone()),
        engine.clone(),
    ));

    let health_checker = HealthChecker::new(db_pool.clone());

    // Background workers
    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let mut worker_handles = Vec::new();

    let retry_config = RetrySchedulerConfig::from_env();
    info!(
        poll_interval_secs = retry_config.poll_interval.as_secs(),
        max_attempts = retry_config.max_attempts,
        "Starting retry scheduler worker"
    );
    let retry_worker =
        RetrySchedulerWorker::new(gateway.clone(), tracker.clone(), retry_config);
    worker_handles.push(tokio::spawn(retry_worker.run(worker_shutdown_rx.clone())));

    let sweep_config = ReconciliationSweepConfig::from_env();
    info!(
        poll_interval_secs = sweep_config.poll_interval.as_secs(),
        "Starting reconciliation sweep worker"
    );
    let sweep_worker =
        ReconciliationSweepWorker::new(engine.clone(), tracker.clone(), sweep_config);
    worker_handles.push(tokio::spawn(sweep_worker.run(worker_shutdown_rx.clone())));

    let replay_worker = WebhookReplayWorker::new(ingest.clone(), Duration::from_secs(60));
    worker_handles.push(tokio::spawn(replay_worker.run(worker_shutdown_rx.clone())));

    info!("✅ Background workers started");

    // HTTP surface
    info!("🛣️  Setting up application routes...");
    let state = Arc::new(AppState {
        gateway,
        ingest,
        health_checker,
    });
    let app = api::router(state);
    info!("✅ Routes configured");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "🚀 Server listening on http://{}", addr);
    info!("✅ Server is ready to accept connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    for handle in worker_handles {
        if let Err(e) = tokio::time::timeout(Duration::from_secs(5), handle).await {
            error!(error = %e, "Timed out waiting for worker shutdown");
        }
    }

    info!("👋 Server shutdown complete");

    Ok(())
}
