//! Durable job queue
//!
//! FIFO within priority (lower number wins), exponential retry backoff,
//! per-job progress streaming, dead-letter retention and cooperative
//! cancellation. All job state lives in the store; this crate is the only
//! component that mutates it.

use chrono::{Duration, Utc};
use maes_common::job::{JobRecord, JobSpec, JobStatus};
use maes_common::CoreResult;
use maes_store::{JobCounts, JobRepository, RetentionPolicy};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One progress event on the streaming channel.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct JobProgress {
    pub job_id: Uuid,
    pub progress: u8,
}

/// A claimed job together with its cancellation token.
pub struct LeasedJob {
    pub record: JobRecord,
    pub cancel: CancellationToken,
}

/// The shared queue facade.
pub struct JobQueue {
    jobs: Arc<dyn JobRepository>,
    progress_tx: broadcast::Sender<JobProgress>,
    /// Tokens for jobs leased by this process.
    cancels: RwLock<HashMap<Uuid, CancellationToken>>,
    retention: RetentionPolicy,
}

impl JobQueue {
    pub fn new(jobs: Arc<dyn JobRepository>) -> Self {
        let (progress_tx, _) = broadcast::channel(256);
        Self {
            jobs,
            progress_tx,
            cancels: RwLock::new(HashMap::new()),
            retention: RetentionPolicy::default(),
        }
    }

    /// Enqueue an assessment run; returns the job id.
    pub async fn enqueue(&self, spec: JobSpec) -> CoreResult<Uuid> {
        let record = JobRecord::from_spec(spec, Utc::now());
        let id = record.id;
        self.jobs.insert(&record).await?;
        tracing::info!(job = %id, tenant = %record.tenant_id, priority = record.priority, "job enqueued");
        Ok(id)
    }

    /// Claim the next due job, arming a cancellation token for it.
    pub async fn dequeue(&self) -> CoreResult<Option<LeasedJob>> {
        let Some(record) = self.jobs.claim_next(Utc::now()).await? else {
            return Ok(None);
        };
        let cancel = CancellationToken::new();
        if record.cancel_requested {
            // Cancelled while still queued on another process's watch.
            cancel.cancel();
        }
        self.cancels.write().insert(record.id, cancel.clone());
        Ok(Some(LeasedJob { record, cancel }))
    }

    /// Monotonic progress write plus broadcast. A cross-process cancel
    /// request observed here trips the local token.
    pub async fn report_progress(&self, job_id: Uuid, progress: u8) -> CoreResult<()> {
        let cancel_requested = self.jobs.set_progress(job_id, progress).await?;
        let _ = self.progress_tx.send(JobProgress { job_id, progress });
        if cancel_requested {
            if let Some(token) = self.cancels.read().get(&job_id) {
                token.cancel();
            }
        }
        Ok(())
    }

    /// Record which assessment row the job materialized into.
    pub async fn bind_assessment(&self, job_id: Uuid, assessment_id: Uuid) -> CoreResult<()> {
        self.jobs.set_assessment(job_id, assessment_id).await?;
        Ok(())
    }

    pub async fn complete(&self, job_id: Uuid) -> CoreResult<()> {
        self.jobs.complete(job_id).await?;
        self.cancels.write().remove(&job_id);
        Ok(())
    }

    /// Apply the retry policy to a failed attempt. Returns the resulting
    /// status: queued for another attempt, or failed into the dead letter.
    pub async fn fail(&self, job: &JobRecord, error: &str) -> CoreResult<JobStatus> {
        self.cancels.write().remove(&job.id);
        if job.attempts < job.max_attempts {
            let delay = Duration::seconds(job.backoff_delay_secs() as i64);
            let run_at = Utc::now() + delay;
            self.jobs.retry(job.id, error, run_at).await?;
            tracing::warn!(
                job = %job.id,
                attempt = job.attempts,
                retry_in_secs = delay.num_seconds(),
                error,
                "job attempt failed, retrying"
            );
            Ok(JobStatus::Queued)
        } else {
            self.jobs.fail(job.id, error).await?;
            tracing::error!(job = %job.id, attempts = job.attempts, error, "job dead-lettered");
            Ok(JobStatus::Failed)
        }
    }

    /// Terminal acknowledgement after a worker observed cancellation.
    pub async fn acknowledge_cancel(&self, job_id: Uuid) -> CoreResult<()> {
        self.jobs.mark_cancelled(job_id).await?;
        self.cancels.write().remove(&job_id);
        Ok(())
    }

    /// Mark the job cancelled (pre-pickup) or request cooperative
    /// cancellation of a running one.
    pub async fn cancel(&self, job_id: Uuid) -> CoreResult<Option<JobStatus>> {
        let status = self.jobs.request_cancel(job_id).await?;
        if let Some(token) = self.cancels.read().get(&job_id) {
            token.cancel();
        }
        Ok(status)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgress> {
        self.progress_tx.subscribe()
    }

    pub async fn get(&self, job_id: Uuid) -> CoreResult<Option<JobRecord>> {
        Ok(self.jobs.get(job_id).await?)
    }

    pub async fn find_by_assessment(&self, assessment_id: Uuid) -> CoreResult<Option<JobRecord>> {
        Ok(self.jobs.find_by_assessment(assessment_id).await?)
    }

    pub async fn stats(&self) -> CoreResult<JobCounts> {
        Ok(self.jobs.counts().await?)
    }

    /// Enforce dead-letter retention; returns deleted rows.
    pub async fn prune(&self) -> CoreResult<u64> {
        Ok(self.jobs.prune(Utc::now(), &self.retention).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maes_common::{Benchmark, TriggeredBy};
    use maes_store::memory::InMemoryJobRepository;

    fn queue() -> JobQueue {
        JobQueue::new(Arc::new(InMemoryJobRepository::default()))
    }

    fn spec() -> JobSpec {
        JobSpec::new(Uuid::new_v4(), Benchmark::CisV4, "run", TriggeredBy::Api)
    }

    #[tokio::test]
    async fn scheduled_priority_wins_over_default() {
        let q = queue();
        let ad_hoc = q.enqueue(spec()).await.unwrap();
        let scheduled = q.enqueue(spec().scheduled()).await.unwrap();

        let first = q.dequeue().await.unwrap().unwrap();
        assert_eq!(first.record.id, scheduled);
        let second = q.dequeue().await.unwrap().unwrap();
        assert_eq!(second.record.id, ad_hoc);
    }

    #[tokio::test]
    async fn failed_attempts_back_off_then_dead_letter() {
        let q = queue();
        let id = q.enqueue(spec()).await.unwrap();

        // Attempt 1 fails: requeued 5s out, not immediately claimable.
        let lease = q.dequeue().await.unwrap().unwrap();
        assert_eq!(lease.record.attempts, 1);
        assert_eq!(q.fail(&lease.record, "boom").await.unwrap(), JobStatus::Queued);
        assert!(q.dequeue().await.unwrap().is_none());
        let job = q.get(id).await.unwrap().unwrap();
        assert!(job.run_at > Utc::now() + Duration::seconds(3));
        assert!(job.run_at <= Utc::now() + Duration::seconds(6));

        // Drive the remaining attempts by hand.
        let repo = &q.jobs;
        repo.retry(id, "boom", Utc::now()).await.unwrap();
        let lease = q.dequeue().await.unwrap().unwrap();
        assert_eq!(lease.record.attempts, 2);
        assert_eq!(q.fail(&lease.record, "boom").await.unwrap(), JobStatus::Queued);

        repo.retry(id, "boom", Utc::now()).await.unwrap();
        let lease = q.dequeue().await.unwrap().unwrap();
        assert_eq!(lease.record.attempts, 3);
        assert_eq!(q.fail(&lease.record, "boom").await.unwrap(), JobStatus::Failed);

        let job = q.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn cancel_before_pickup_prevents_claim() {
        let q = queue();
        let id = q.enqueue(spec()).await.unwrap();
        let status = q.cancel(id).await.unwrap().unwrap();
        assert_eq!(status, JobStatus::Cancelled);
        assert!(q.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cross_process_cancel_trips_token_on_progress_write() {
        let q = queue();
        let id = q.enqueue(spec()).await.unwrap();
        let lease = q.dequeue().await.unwrap().unwrap();
        assert!(!lease.cancel.is_cancelled());

        // Another process flags the running job.
        q.jobs.request_cancel(id).await.unwrap();
        q.report_progress(id, 42).await.unwrap();
        assert!(lease.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn progress_events_are_broadcast() {
        let q = queue();
        let id = q.enqueue(spec()).await.unwrap();
        let _lease = q.dequeue().await.unwrap().unwrap();
        let mut rx = q.subscribe();
        q.report_progress(id, 17).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.job_id, id);
        assert_eq!(event.progress, 17);
    }

    #[tokio::test]
    async fn completion_clears_the_lease() {
        let q = queue();
        let id = q.enqueue(spec()).await.unwrap();
        let _lease = q.dequeue().await.unwrap().unwrap();
        q.complete(id).await.unwrap();
        let job = q.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
    }
}
