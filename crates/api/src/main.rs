use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use domain::services::{GroupBuyEngine, SystemClock};
use group_buy_api::{
    app,
    config::Config,
    jobs::{AutoCompleteJob, ExpireGroupBuysJob, JobScheduler, PoolMetricsJob},
    middleware,
};
use persistence::{PgLedgerStore, PgNotificationService};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    middleware::logging::init_logging(&config.logging)?;
    middleware::init_metrics()?;

    info!("Starting Group Buy API v{}", env!("CARGO_PKG_VERSION"));

    let pool = persistence::db::create_pool(&config.database_config()).await?;

    info!("Running database migrations...");
    persistence::db::run_migrations(&pool).await?;

    let mut store = PgLedgerStore::new(pool.clone());
    if config.database.lock_timeout_ms > 0 {
        store = store.with_lock_timeout(Duration::from_millis(config.database.lock_timeout_ms));
    }

    let engine = Arc::new(GroupBuyEngine::new(
        Arc::new(store),
        Arc::new(PgNotificationService::new(pool.clone())),
        Arc::new(SystemClock),
        config.engine_config(),
    ));

    let mut scheduler = JobScheduler::new();
    scheduler.register(ExpireGroupBuysJob::new(
        engine.clone(),
        config.jobs.sweep_interval_secs,
    ));
    if config.jobs.auto_complete_enabled {
        scheduler.register(AutoCompleteJob::new(
            engine.clone(),
            chrono::Duration::hours(config.jobs.auto_complete_grace_hours),
            config.jobs.sweep_interval_secs,
        ));
    }
    scheduler.register(PoolMetricsJob::new(pool.clone()));
    scheduler.start();

    let addr = config.socket_addr()?;
    let app = app::create_app(config, engine);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(30)).await;
    pool.close().await;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}
