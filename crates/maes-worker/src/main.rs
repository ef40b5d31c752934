//! Worker process entry point

use maes_catalog::{CheckerRegistry, ControlCatalog};
use maes_common::CoreConfig;
use maes_engine::AssessmentEngine;
use maes_graph::GraphClientFactory;
use maes_queue::JobQueue;
use maes_store::Store;
use maes_worker::WorkerPool;
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

    tracing::info!("maes-worker v{}", env!("CARGO_PKG_VERSION"));

    let config = CoreConfig::from_env();
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required"))?;
    let store = Store::connect(database_url)
        .await
        .map_err(|e| anyhow::anyhow!("store: {e}"))?;

    let queue = Arc::new(JobQueue::new(store.jobs.clone()));
    let engine = Arc::new(AssessmentEngine::new(
        store.clone(),
        Arc::new(ControlCatalog::builtin()),
        Arc::new(CheckerRegistry::with_builtins()),
    ));
    let factory = Arc::new(GraphClientFactory::new());
    let provider = WorkerPool::graph_provider(
        factory,
        config.cert_key_path.clone(),
        config.cert_path.clone(),
    );
    let pool = WorkerPool::new(store, queue, engine, provider, config.worker_concurrency);

    let shutdown = pool.shutdown_token();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutting down");
        shutdown.cancel();
    });

    pool.run().await;
    Ok(())
}
