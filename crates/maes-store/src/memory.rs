//! In-memory repository implementations for tests and development

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use maes_common::job::{JobRecord, JobStatus};
use maes_common::{Assessment, ControlResult, ReportArtifact, Schedule, Tenant};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::repo::{
    AssessmentRepository, ControlResultRepository, JobCounts, JobRepository, ReportRepository,
    RetentionPolicy, ScheduleRepository, TenantRepository,
};
use crate::{StoreError, StoreResult};

#[derive(Default)]
pub struct InMemoryTenantRepository {
    tenants: RwLock<HashMap<Uuid, Tenant>>,
}

#[async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn insert(&self, tenant: &Tenant) -> StoreResult<()> {
        let mut tenants = self.tenants.write();
        if tenant.active
            && tenants
                .values()
                .any(|t| t.active && t.directory_tenant_id == tenant.directory_tenant_id)
        {
            return Err(StoreError::Conflict(format!(
                "active tenant for directory {} already exists",
                tenant.directory_tenant_id
            )));
        }
        tenants.insert(tenant.id, tenant.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Tenant>> {
        Ok(self.tenants.read().get(&id).cloned())
    }

    async fn list_active(&self) -> StoreResult<Vec<Tenant>> {
        Ok(self.tenants.read().values().filter(|t| t.active).cloned().collect())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.tenants.write().remove(&id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAssessmentRepository {
    assessments: RwLock<HashMap<Uuid, Assessment>>,
}

#[async_trait]
impl AssessmentRepository for InMemoryAssessmentRepository {
    async fn insert(&self, assessment: &Assessment) -> StoreResult<()> {
        self.assessments.write().insert(assessment.id, assessment.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Assessment>> {
        Ok(self.assessments.read().get(&id).cloned())
    }

    async fn list_for_tenant(&self, tenant_id: Uuid, limit: usize) -> StoreResult<Vec<Assessment>> {
        let mut out: Vec<Assessment> = self
            .assessments
            .read()
            .values()
            .filter(|a| a.tenant_id == tenant_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit);
        Ok(out)
    }

    async fn mark_running(
        &self,
        id: Uuid,
        started_at: DateTime<Utc>,
        progress: u8,
    ) -> StoreResult<()> {
        let mut assessments = self.assessments.write();
        let a = assessments
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("assessment {id}")))?;
        a.status = maes_common::AssessmentStatus::Running;
        a.started_at = Some(started_at);
        a.progress = a.progress.max(progress);
        Ok(())
    }

    async fn merge_parameters(&self, id: Uuid, patch: &Value) -> StoreResult<()> {
        let mut assessments = self.assessments.write();
        let a = assessments
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("assessment {id}")))?;
        match (&mut a.parameters, patch) {
            (Value::Object(base), Value::Object(extra)) => {
                for (k, v) in extra {
                    base.insert(k.clone(), v.clone());
                }
            }
            (slot, patch) => *slot = patch.clone(),
        }
        Ok(())
    }

    async fn bump_progress(&self, id: Uuid, progress: u8) -> StoreResult<()> {
        let mut assessments = self.assessments.write();
        let a = assessments
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("assessment {id}")))?;
        if progress > a.progress {
            a.progress = progress;
        }
        Ok(())
    }

    async fn finalize(&self, assessment: &Assessment) -> StoreResult<()> {
        let mut assessments = self.assessments.write();
        let a = assessments
            .get_mut(&assessment.id)
            .ok_or_else(|| StoreError::NotFound(format!("assessment {}", assessment.id)))?;
        *a = assessment.clone();
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryControlResultRepository {
    results: RwLock<HashMap<(Uuid, String), ControlResult>>,
}

#[async_trait]
impl ControlResultRepository for InMemoryControlResultRepository {
    async fn upsert(&self, result: &ControlResult) -> StoreResult<()> {
        self.results
            .write()
            .insert((result.assessment_id, result.control_id.clone()), result.clone());
        Ok(())
    }

    async fn list_for_assessment(&self, assessment_id: Uuid) -> StoreResult<Vec<ControlResult>> {
        let mut out: Vec<ControlResult> = self
            .results
            .read()
            .values()
            .filter(|r| r.assessment_id == assessment_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.control_id.cmp(&b.control_id));
        Ok(out)
    }
}

#[derive(Default)]
pub struct InMemoryScheduleRepository {
    schedules: RwLock<HashMap<Uuid, Schedule>>,
}

#[async_trait]
impl ScheduleRepository for InMemoryScheduleRepository {
    async fn insert(&self, schedule: &Schedule) -> StoreResult<()> {
        let mut schedules = self.schedules.write();
        if schedules
            .values()
            .any(|s| s.tenant_id == schedule.tenant_id && s.name == schedule.name)
        {
            return Err(StoreError::Conflict(format!(
                "schedule '{}' already exists for tenant",
                schedule.name
            )));
        }
        schedules.insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn update(&self, schedule: &Schedule) -> StoreResult<()> {
        let mut schedules = self.schedules.write();
        let slot = schedules
            .get_mut(&schedule.id)
            .ok_or_else(|| StoreError::NotFound(format!("schedule {}", schedule.id)))?;
        *slot = schedule.clone();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.schedules.write().remove(&id);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Schedule>> {
        Ok(self.schedules.read().get(&id).cloned())
    }

    async fn list_for_tenant(&self, tenant_id: Uuid) -> StoreResult<Vec<Schedule>> {
        let mut out: Vec<Schedule> = self
            .schedules
            .read()
            .values()
            .filter(|s| s.tenant_id == tenant_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn list_active(&self) -> StoreResult<Vec<Schedule>> {
        Ok(self.schedules.read().values().filter(|s| s.active).cloned().collect())
    }

    async fn list_overdue(&self, now: DateTime<Utc>) -> StoreResult<Vec<Schedule>> {
        Ok(self
            .schedules
            .read()
            .values()
            .filter(|s| s.active && s.next_run_at.map(|t| t < now).unwrap_or(false))
            .cloned()
            .collect())
    }

    async fn mark_fired(
        &self,
        id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut schedules = self.schedules.write();
        let s = schedules
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("schedule {id}")))?;
        s.last_run_at = Some(last_run_at);
        s.next_run_at = Some(next_run_at);
        Ok(())
    }

    async fn set_last_assessment(&self, id: Uuid, assessment_id: Uuid) -> StoreResult<()> {
        let mut schedules = self.schedules.write();
        if let Some(s) = schedules.get_mut(&id) {
            s.last_assessment_id = Some(assessment_id);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryReportRepository {
    reports: RwLock<HashMap<Uuid, ReportArtifact>>,
}

#[async_trait]
impl ReportRepository for InMemoryReportRepository {
    async fn insert(&self, artifact: &ReportArtifact) -> StoreResult<()> {
        self.reports.write().insert(artifact.id, artifact.clone());
        Ok(())
    }

    async fn list_for_assessment(&self, assessment_id: Uuid) -> StoreResult<Vec<ReportArtifact>> {
        let mut out: Vec<ReportArtifact> = self
            .reports
            .read()
            .values()
            .filter(|r| r.assessment_id == assessment_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn find_by_file_name(
        &self,
        assessment_id: Uuid,
        file_name: &str,
    ) -> StoreResult<Option<ReportArtifact>> {
        Ok(self
            .reports
            .read()
            .values()
            .find(|r| r.assessment_id == assessment_id && r.file_name == file_name)
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<Uuid, JobRecord>>,
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn insert(&self, job: &JobRecord) -> StoreResult<()> {
        self.jobs.write().insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<JobRecord>> {
        Ok(self.jobs.read().get(&id).cloned())
    }

    async fn find_by_assessment(&self, assessment_id: Uuid) -> StoreResult<Option<JobRecord>> {
        Ok(self
            .jobs
            .read()
            .values()
            .find(|j| j.assessment_id == Some(assessment_id))
            .cloned())
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> StoreResult<Option<JobRecord>> {
        let mut jobs = self.jobs.write();
        let next_id = jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued && j.run_at <= now)
            .min_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            })
            .map(|j| j.id);
        let Some(id) = next_id else {
            return Ok(None);
        };
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(None);
        };
        job.status = JobStatus::Running;
        job.attempts += 1;
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn set_progress(&self, id: Uuid, progress: u8) -> StoreResult<bool> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("job {id}")))?;
        if progress > job.progress {
            job.progress = progress;
        }
        job.updated_at = Utc::now();
        Ok(job.cancel_requested)
    }

    async fn set_assessment(&self, id: Uuid, assessment_id: Uuid) -> StoreResult<()> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("job {id}")))?;
        job.assessment_id = Some(assessment_id);
        Ok(())
    }

    async fn complete(&self, id: Uuid) -> StoreResult<()> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("job {id}")))?;
        job.status = JobStatus::Completed;
        job.progress = 100;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn retry(&self, id: Uuid, error: &str, run_at: DateTime<Utc>) -> StoreResult<()> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("job {id}")))?;
        job.status = JobStatus::Queued;
        job.error_message = Some(error.to_string());
        job.run_at = run_at;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str) -> StoreResult<()> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("job {id}")))?;
        job.status = JobStatus::Failed;
        job.error_message = Some(error.to_string());
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn request_cancel(&self, id: Uuid) -> StoreResult<Option<JobStatus>> {
        let mut jobs = self.jobs.write();
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(None);
        };
        job.cancel_requested = true;
        if job.status == JobStatus::Queued {
            job.status = JobStatus::Cancelled;
        }
        job.updated_at = Utc::now();
        Ok(Some(job.status))
    }

    async fn mark_cancelled(&self, id: Uuid) -> StoreResult<()> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("job {id}")))?;
        job.status = JobStatus::Cancelled;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn counts(&self) -> StoreResult<JobCounts> {
        let jobs = self.jobs.read();
        let mut counts = JobCounts::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Running => counts.running += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
            }
        }
        Ok(counts)
    }

    async fn prune(&self, now: DateTime<Utc>, policy: &RetentionPolicy) -> StoreResult<u64> {
        let mut jobs = self.jobs.write();
        let mut doomed: Vec<Uuid> = Vec::new();

        let mut done: Vec<&JobRecord> = jobs
            .values()
            .filter(|j| matches!(j.status, JobStatus::Completed | JobStatus::Cancelled))
            .collect();
        done.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        for (i, job) in done.iter().enumerate() {
            if i >= policy.max_completed || now - job.updated_at > policy.completed_ttl {
                doomed.push(job.id);
            }
        }

        let mut failed: Vec<&JobRecord> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Failed)
            .collect();
        failed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        for (i, job) in failed.iter().enumerate() {
            if i >= policy.max_failed || now - job.updated_at > policy.failed_ttl {
                doomed.push(job.id);
            }
        }

        for id in &doomed {
            jobs.remove(id);
        }
        Ok(doomed.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maes_common::job::JobSpec;
    use maes_common::{Benchmark, TriggeredBy};

    fn job(priority: i16, created_offset_secs: i64) -> JobRecord {
        let spec = JobSpec::new(Uuid::new_v4(), Benchmark::CisV4, "run", TriggeredBy::Api);
        let mut record =
            JobRecord::from_spec(spec, Utc::now() - chrono::Duration::seconds(created_offset_secs));
        record.priority = priority;
        record
    }

    #[tokio::test]
    async fn claim_prefers_lower_priority_then_fifo() {
        let repo = InMemoryJobRepository::default();
        let late_high = job(5, 0);
        let early_low = job(10, 60);
        let early_high = job(5, 60);
        for j in [&late_high, &early_low, &early_high] {
            repo.insert(j).await.unwrap();
        }

        let first = repo.claim_next(Utc::now()).await.unwrap().unwrap();
        assert_eq!(first.id, early_high.id);
        let second = repo.claim_next(Utc::now()).await.unwrap().unwrap();
        assert_eq!(second.id, late_high.id);
        let third = repo.claim_next(Utc::now()).await.unwrap().unwrap();
        assert_eq!(third.id, early_low.id);
        assert!(repo.claim_next(Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_skips_jobs_scheduled_in_the_future() {
        let repo = InMemoryJobRepository::default();
        let mut j = job(5, 0);
        j.run_at = Utc::now() + chrono::Duration::seconds(30);
        repo.insert(&j).await.unwrap();
        assert!(repo.claim_next(Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn progress_is_monotonic() {
        let repo = InMemoryJobRepository::default();
        let j = job(5, 0);
        repo.insert(&j).await.unwrap();
        repo.set_progress(j.id, 50).await.unwrap();
        repo.set_progress(j.id, 20).await.unwrap();
        assert_eq!(repo.get(j.id).await.unwrap().unwrap().progress, 50);
    }

    #[tokio::test]
    async fn cancel_queued_job_is_terminal() {
        let repo = InMemoryJobRepository::default();
        let j = job(5, 0);
        repo.insert(&j).await.unwrap();
        let status = repo.request_cancel(j.id).await.unwrap().unwrap();
        assert_eq!(status, JobStatus::Cancelled);
        assert!(repo.claim_next(Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prune_applies_ttl_and_caps() {
        let repo = InMemoryJobRepository::default();
        let now = Utc::now();
        // One stale completed job and one fresh one.
        let mut stale = job(5, 0);
        stale.status = JobStatus::Completed;
        stale.updated_at = now - chrono::Duration::hours(48);
        let mut fresh = job(5, 0);
        fresh.status = JobStatus::Completed;
        fresh.updated_at = now;
        repo.insert(&stale).await.unwrap();
        repo.insert(&fresh).await.unwrap();

        let deleted = repo.prune(now, &RetentionPolicy::default()).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(repo.get(stale.id).await.unwrap().is_none());
        assert!(repo.get(fresh.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn assessment_progress_is_monotonic() {
        let repo = InMemoryAssessmentRepository::default();
        let a = Assessment::new(
            Uuid::new_v4(),
            Benchmark::CisV4,
            "run".into(),
            TriggeredBy::Api,
            Value::Null,
        );
        repo.insert(&a).await.unwrap();
        repo.bump_progress(a.id, 42).await.unwrap();
        repo.bump_progress(a.id, 17).await.unwrap();
        assert_eq!(repo.get(a.id).await.unwrap().unwrap().progress, 42);
    }

    #[tokio::test]
    async fn duplicate_schedule_name_conflicts() {
        let repo = InMemoryScheduleRepository::default();
        let tenant = Uuid::new_v4();
        let schedule = Schedule {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            name: "weekly".into(),
            benchmark: Benchmark::CisV4,
            frequency: maes_common::Frequency::Weekly,
            active: true,
            next_run_at: Some(Utc::now()),
            last_run_at: None,
            last_assessment_id: None,
            parameters: Value::Null,
            created_by: "tests".into(),
            created_at: Utc::now(),
        };
        repo.insert(&schedule).await.unwrap();
        let mut dup = schedule.clone();
        dup.id = Uuid::new_v4();
        match repo.insert(&dup).await {
            Err(StoreError::Conflict(_)) => {}
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn active_tenant_per_directory_is_unique() {
        let repo = InMemoryTenantRepository::default();
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: "Contoso".into(),
            directory_tenant_id: "dir-1".into(),
            domain: "contoso.onmicrosoft.com".into(),
            credentials: maes_common::Credentials::Secret {
                client_id: "c".into(),
                client_secret: "s".into(),
            },
            active: true,
            created_at: Utc::now(),
        };
        repo.insert(&tenant).await.unwrap();
        let mut dup = tenant.clone();
        dup.id = Uuid::new_v4();
        assert!(matches!(repo.insert(&dup).await, Err(StoreError::Conflict(_))));
    }
}
