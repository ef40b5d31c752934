//! Assessment worker pool
//!
//! Fixed-concurrency pullers over the job queue. Checker-internal
//! failures land on control results and never fail the job; credential
//! and infrastructure failures fail the job and the queue's retry policy
//! takes over.

use maes_common::{CoreError, Tenant, TriggeredBy};
use maes_engine::{AssessmentEngine, RunOptions};
use maes_graph::{GraphApi, GraphClientFactory};
use maes_queue::{JobQueue, LeasedJob};
use maes_store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Builds a per-tenant Graph surface for one run; swapped out in tests.
pub type GraphProvider =
    Arc<dyn Fn(&Tenant, CancellationToken) -> Box<dyn GraphApi> + Send + Sync>;

/// How often an idle worker re-polls the queue.
const IDLE_POLL: Duration = Duration::from_millis(500);
/// How often queue retention is enforced.
const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

/// Fixed pool of assessment workers.
pub struct WorkerPool {
    store: Store,
    queue: Arc<JobQueue>,
    engine: Arc<AssessmentEngine>,
    graph: GraphProvider,
    concurrency: usize,
    shutdown: CancellationToken,
}

impl WorkerPool {
    pub fn new(
        store: Store,
        queue: Arc<JobQueue>,
        engine: Arc<AssessmentEngine>,
        graph: GraphProvider,
        concurrency: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            queue,
            engine,
            graph,
            concurrency: concurrency.max(1),
            shutdown: CancellationToken::new(),
        })
    }

    /// Provider over the real client factory. Certificate tenants with no
    /// explicit key material fall back to the configured default PEM paths.
    pub fn graph_provider(
        factory: Arc<GraphClientFactory>,
        default_key_path: std::path::PathBuf,
        default_cert_path: std::path::PathBuf,
    ) -> GraphProvider {
        Arc::new(move |tenant, cancel| {
            let mut tenant = tenant.clone();
            if let maes_common::Credentials::Certificate { key_path, cert_path, .. } =
                &mut tenant.credentials
            {
                if key_path.is_empty() {
                    *key_path = default_key_path.to_string_lossy().into_owned();
                }
                if cert_path.is_empty() {
                    *cert_path = default_cert_path.to_string_lossy().into_owned();
                }
            }
            Box::new(factory.client_for(&tenant, cancel))
        })
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the pool until shutdown.
    pub async fn run(self: Arc<Self>) {
        let mut handles = Vec::with_capacity(self.concurrency + 1);
        for worker_id in 0..self.concurrency {
            let this = self.clone();
            handles.push(tokio::spawn(async move { this.worker_loop(worker_id).await }));
        }
        let this = self.clone();
        handles.push(tokio::spawn(async move { this.prune_loop().await }));
        tracing::info!(workers = self.concurrency, "worker pool started");
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn worker_loop(&self, worker_id: usize) {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            match self.queue.dequeue().await {
                Ok(Some(lease)) => {
                    self.process(worker_id, lease).await;
                }
                Ok(None) => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(IDLE_POLL) => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(worker = worker_id, error = %e, "dequeue failed");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(IDLE_POLL) => {}
                    }
                }
            }
        }
        tracing::info!(worker = worker_id, "worker stopped");
    }

    async fn prune_loop(&self) {
        let mut tick = tokio::time::interval(PRUNE_INTERVAL);
        tick.tick().await;
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tick.tick() => {
                    match self.queue.prune().await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!(deleted = n, "pruned retained jobs"),
                        Err(e) => tracing::warn!(error = %e, "job prune failed"),
                    }
                }
            }
        }
    }

    async fn process(&self, worker_id: usize, lease: LeasedJob) {
        let job = lease.record;
        if lease.cancel.is_cancelled() {
            // Cancelled between claim and pickup: acknowledge and skip.
            if let Err(e) = self.queue.acknowledge_cancel(job.id).await {
                tracing::warn!(job = %job.id, error = %e, "cancel acknowledgement failed");
            }
            return;
        }

        tracing::info!(worker = worker_id, job = %job.id, tenant = %job.tenant_id,
            attempt = job.attempts, "job picked up");

        let tenant = match self.store.tenants.get(job.tenant_id).await {
            Ok(Some(tenant)) => tenant,
            Ok(None) => {
                let _ = self.queue.fail(&job, "tenant not found").await;
                return;
            }
            Err(e) => {
                let _ = self.queue.fail(&job, &e.to_string()).await;
                return;
            }
        };

        // Bind the assessment id before running so a crashed attempt is
        // resumed, not duplicated, on retry.
        let assessment_id = match job.assessment_id {
            Some(id) => id,
            None => {
                let id = uuid::Uuid::new_v4();
                if let Err(e) = self.queue.bind_assessment(job.id, id).await {
                    let _ = self.queue.fail(&job, &e.to_string()).await;
                    return;
                }
                id
            }
        };

        // Progress events flow through a channel so the engine's sync sink
        // can feed the async queue; bursts coalesce to the latest value.
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<u8>();
        let forwarder = tokio::spawn({
            let queue = self.queue.clone();
            let job_id = job.id;
            async move {
                while let Some(mut progress) = rx.recv().await {
                    while let Ok(later) = rx.try_recv() {
                        progress = later;
                    }
                    if let Err(e) = queue.report_progress(job_id, progress).await {
                        tracing::warn!(job = %job_id, error = %e, "progress update failed");
                    }
                }
            }
        });
        let sink: maes_engine::engine::ProgressSink = {
            let tx = tx.clone();
            Arc::new(move |progress| {
                let _ = tx.send(progress);
            })
        };
        drop(tx);

        let graph = (self.graph)(&tenant, lease.cancel.clone());
        let mut opts = RunOptions::new(job.assessment_name.clone(), job.triggered_by)
            .with_assessment_id(assessment_id)
            .with_cancel(lease.cancel.clone())
            .with_progress(sink);
        opts.parameters = job.parameters.clone();

        let outcome = self.engine.run(&tenant, graph.as_ref(), job.benchmark, opts).await;
        let _ = forwarder.await;

        match outcome {
            Ok(summary) => {
                if let TriggeredBy::Schedule(schedule_id) = job.triggered_by {
                    if let Err(e) = self
                        .store
                        .schedules
                        .set_last_assessment(schedule_id, summary.id)
                        .await
                    {
                        tracing::warn!(schedule = %schedule_id, error = %e, "last-assessment update failed");
                    }
                }
                if let Err(e) = self.queue.complete(job.id).await {
                    tracing::warn!(job = %job.id, error = %e, "job completion failed");
                }
            }
            Err(error) => {
                // Engine-level failures (auth, empty benchmark, store) fail
                // the attempt; the queue decides between retry and dead
                // letter. Checker failures never reach this path.
                match self.queue.fail(&job, &error.to_string()).await {
                    Ok(status) => {
                        tracing::warn!(job = %job.id, ?status, error = %error, "job attempt failed")
                    }
                    Err(e) => tracing::error!(job = %job.id, error = %e, "failure handling failed"),
                }
                if matches!(error, CoreError::Internal(_)) {
                    tracing::error!(job = %job.id, error = %error, "infrastructure failure");
                }
            }
        }
    }
}
