//! Scheduler process entry point

use maes_common::CoreConfig;
use maes_queue::JobQueue;
use maes_scheduler::Scheduler;
use maes_store::Store;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("maes-scheduler v{}", env!("CARGO_PKG_VERSION"));

    let config = CoreConfig::from_env();
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required"))?;
    let store = Store::connect(database_url)
        .await
        .map_err(|e| anyhow::anyhow!("store: {e}"))?;

    let queue = std::sync::Arc::new(JobQueue::new(store.jobs.clone()));
    let scheduler = Scheduler::new(store, queue);

    tokio::select! {
        result = scheduler.clone().start() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "scheduler stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }
    Ok(())
}
