//! API process entry point

use maes_api::{router, ApiState};
use maes_catalog::ControlCatalog;
use maes_common::CoreConfig;
use maes_engine::Comparator;
use maes_queue::JobQueue;
use maes_report::ReportGenerator;
use maes_scheduler::Scheduler;
use maes_store::Store;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("maes-api v{}", env!("CARGO_PKG_VERSION"));

    let config = CoreConfig::from_env();
    if config.service_token.is_empty() {
        tracing::warn!("SERVICE_AUTH_TOKEN is unset; all protected endpoints will reject");
    }
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required"))?;
    let store = Store::connect(database_url)
        .await
        .map_err(|e| anyhow::anyhow!("store: {e}"))?;

    let catalog = Arc::new(ControlCatalog::builtin());
    let queue = Arc::new(JobQueue::new(store.jobs.clone()));
    // CRUD-only scheduler instance; timers are armed by the scheduler
    // process, which also sweeps up changes made through this API.
    let scheduler = Scheduler::new(store.clone(), queue.clone());
    let comparator = Arc::new(Comparator::new(store.clone()));
    let reports = Arc::new(ReportGenerator::new(
        store.clone(),
        catalog,
        config.reports_dir.clone(),
    ));

    // Artifact retention: this process is the single cleanup writer.
    let retention = reports.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(24 * 3600));
        tick.tick().await;
        loop {
            tick.tick().await;
            match retention.cleanup(std::time::Duration::from_secs(30 * 24 * 3600)).await {
                Ok(0) => {}
                Ok(n) => tracing::info!(deleted = n, "report retention sweep"),
                Err(e) => tracing::warn!(error = %e, "report retention sweep failed"),
            }
        }
    });

    let state = ApiState {
        store,
        queue,
        scheduler,
        comparator,
        reports,
        service_token: Arc::new(config.service_token.clone()),
    };

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
