//! Repository traits over the `maes` schema

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use maes_common::job::JobRecord;
use maes_common::{Assessment, ControlResult, ReportArtifact, Schedule, Tenant};
use serde_json::Value;
use uuid::Uuid;

use crate::StoreResult;

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn insert(&self, tenant: &Tenant) -> StoreResult<()>;
    async fn get(&self, id: Uuid) -> StoreResult<Option<Tenant>>;
    async fn list_active(&self) -> StoreResult<Vec<Tenant>>;
    /// Removing a tenant cascades over its assessments, schedules and
    /// reports.
    async fn delete(&self, id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait AssessmentRepository: Send + Sync {
    async fn insert(&self, assessment: &Assessment) -> StoreResult<()>;
    async fn get(&self, id: Uuid) -> StoreResult<Option<Assessment>>;
    async fn list_for_tenant(&self, tenant_id: Uuid, limit: usize) -> StoreResult<Vec<Assessment>>;
    async fn mark_running(
        &self,
        id: Uuid,
        started_at: DateTime<Utc>,
        progress: u8,
    ) -> StoreResult<()>;
    /// Shallow-merge a JSON object into `parameters`.
    async fn merge_parameters(&self, id: Uuid, patch: &Value) -> StoreResult<()>;
    /// Monotonic: writes only when the new value is greater.
    async fn bump_progress(&self, id: Uuid, progress: u8) -> StoreResult<()>;
    /// Terminal write: status, totals, scores, timing, error message.
    async fn finalize(&self, assessment: &Assessment) -> StoreResult<()>;
}

#[async_trait]
pub trait ControlResultRepository: Send + Sync {
    /// At most one result per (assessment, control); retried runs replace
    /// their earlier row.
    async fn upsert(&self, result: &ControlResult) -> StoreResult<()>;
    /// Ordered by control id.
    async fn list_for_assessment(&self, assessment_id: Uuid) -> StoreResult<Vec<ControlResult>>;
}

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Conflict when the tenant already has a schedule of that name.
    async fn insert(&self, schedule: &Schedule) -> StoreResult<()>;
    async fn update(&self, schedule: &Schedule) -> StoreResult<()>;
    async fn delete(&self, id: Uuid) -> StoreResult<()>;
    async fn get(&self, id: Uuid) -> StoreResult<Option<Schedule>>;
    async fn list_for_tenant(&self, tenant_id: Uuid) -> StoreResult<Vec<Schedule>>;
    async fn list_active(&self) -> StoreResult<Vec<Schedule>>;
    async fn list_overdue(&self, now: DateTime<Utc>) -> StoreResult<Vec<Schedule>>;
    async fn mark_fired(
        &self,
        id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn set_last_assessment(&self, id: Uuid, assessment_id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn insert(&self, artifact: &ReportArtifact) -> StoreResult<()>;
    async fn list_for_assessment(&self, assessment_id: Uuid) -> StoreResult<Vec<ReportArtifact>>;
    async fn find_by_file_name(
        &self,
        assessment_id: Uuid,
        file_name: &str,
    ) -> StoreResult<Option<ReportArtifact>>;
}

/// Live job tallies for the stats endpoints.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct JobCounts {
    pub queued: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

/// Dead-letter retention: completed jobs are kept at least 24 hours
/// (at most 100 rows), failed jobs at least 7 days (at most 50 rows).
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub completed_ttl: Duration,
    pub failed_ttl: Duration,
    pub max_completed: usize,
    pub max_failed: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            completed_ttl: Duration::hours(24),
            failed_ttl: Duration::days(7),
            max_completed: 100,
            max_failed: 50,
        }
    }
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert(&self, job: &JobRecord) -> StoreResult<()>;
    async fn get(&self, id: Uuid) -> StoreResult<Option<JobRecord>>;
    async fn find_by_assessment(&self, assessment_id: Uuid) -> StoreResult<Option<JobRecord>>;
    /// Atomically claim the next due job: lowest priority number first,
    /// FIFO within equal priority. The claimed row moves to running with
    /// `attempts` incremented.
    async fn claim_next(&self, now: DateTime<Utc>) -> StoreResult<Option<JobRecord>>;
    /// Monotonic progress write; returns whether cancellation was
    /// requested so in-flight runs can observe cross-process cancels.
    async fn set_progress(&self, id: Uuid, progress: u8) -> StoreResult<bool>;
    async fn set_assessment(&self, id: Uuid, assessment_id: Uuid) -> StoreResult<()>;
    async fn complete(&self, id: Uuid) -> StoreResult<()>;
    /// Back on the queue with a retry-at instant.
    async fn retry(&self, id: Uuid, error: &str, run_at: DateTime<Utc>) -> StoreResult<()>;
    async fn fail(&self, id: Uuid, error: &str) -> StoreResult<()>;
    /// Queued jobs flip straight to cancelled; running jobs get the
    /// cancel-requested flag. Returns the resulting status.
    async fn request_cancel(&self, id: Uuid) -> StoreResult<Option<maes_common::job::JobStatus>>;
    /// Terminal acknowledgement of a cancelled run.
    async fn mark_cancelled(&self, id: Uuid) -> StoreResult<()>;
    async fn counts(&self) -> StoreResult<JobCounts>;
    /// Apply the retention policy; returns deleted rows.
    async fn prune(&self, now: DateTime<Utc>, policy: &RetentionPolicy) -> StoreResult<u64>;
}
