//! Postgres repositories over the `maes` schema
//!
//! Runtime-checked queries only, so the workspace builds without a live
//! database. Claiming uses `FOR UPDATE SKIP LOCKED`; progress writes are
//! guarded to stay monotonic under concurrent readers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use maes_common::job::{JobRecord, JobStatus};
use maes_common::{Assessment, ControlResult, ReportArtifact, Schedule, Tenant, Totals};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::repo::{
    AssessmentRepository, ControlResultRepository, JobCounts, JobRepository, ReportRepository,
    RetentionPolicy, ScheduleRepository, TenantRepository,
};
use crate::{StoreError, StoreResult};

const MIGRATION: &str = include_str!("../../../migrations/0001_init.sql");

/// Apply the schema migration; idempotent.
pub async fn run_migrations(pool: &PgPool) -> StoreResult<()> {
    sqlx::raw_sql(MIGRATION).execute(pool).await?;
    tracing::info!("maes schema is up to date");
    Ok(())
}

fn parse<T: std::str::FromStr<Err = String>>(raw: String) -> StoreResult<T> {
    raw.parse().map_err(StoreError::Database)
}

fn from_json<T: serde::de::DeserializeOwned>(value: Value) -> StoreResult<T> {
    serde_json::from_value(value).map_err(|e| StoreError::Database(e.to_string()))
}

fn map_tenant(row: &PgRow) -> StoreResult<Tenant> {
    Ok(Tenant {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        directory_tenant_id: row.try_get("directory_tenant_id")?,
        domain: row.try_get("domain")?,
        credentials: from_json(row.try_get::<Value, _>("credentials")?)?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_assessment(row: &PgRow) -> StoreResult<Assessment> {
    Ok(Assessment {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        benchmark: parse(row.try_get::<String, _>("benchmark")?)?,
        name: row.try_get("name")?,
        triggered_by: parse(row.try_get::<String, _>("triggered_by")?)?,
        status: parse(row.try_get::<String, _>("status")?)?,
        progress: row.try_get::<i16, _>("progress")? as u8,
        totals: Totals {
            total: row.try_get::<i32, _>("total")? as u32,
            compliant: row.try_get::<i32, _>("compliant")? as u32,
            non_compliant: row.try_get::<i32, _>("non_compliant")? as u32,
            manual_review: row.try_get::<i32, _>("manual_review")? as u32,
            not_applicable: row.try_get::<i32, _>("not_applicable")? as u32,
            error: row.try_get::<i32, _>("error_count")? as u32,
        },
        overall_score: row.try_get("overall_score")?,
        weighted_score: row.try_get("weighted_score")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        duration_seconds: row.try_get("duration_seconds")?,
        error_message: row.try_get("error_message")?,
        parameters: row.try_get("parameters")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_result(row: &PgRow) -> StoreResult<ControlResult> {
    Ok(ControlResult {
        id: row.try_get("id")?,
        assessment_id: row.try_get("assessment_id")?,
        control_id: row.try_get("control_id")?,
        status: parse(row.try_get::<String, _>("status")?)?,
        score: row.try_get("score")?,
        actual: row.try_get("actual")?,
        evidence: row.try_get("evidence")?,
        remediation: row.try_get("remediation")?,
        error_message: row.try_get("error_message")?,
        checked_at: row.try_get("checked_at")?,
    })
}

fn map_schedule(row: &PgRow) -> StoreResult<Schedule> {
    Ok(Schedule {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        name: row.try_get("name")?,
        benchmark: parse(row.try_get::<String, _>("benchmark")?)?,
        frequency: parse(row.try_get::<String, _>("frequency")?)?,
        active: row.try_get("active")?,
        next_run_at: row.try_get("next_run_at")?,
        last_run_at: row.try_get("last_run_at")?,
        last_assessment_id: row.try_get("last_assessment_id")?,
        parameters: row.try_get("parameters")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_report(row: &PgRow) -> StoreResult<ReportArtifact> {
    Ok(ReportArtifact {
        id: row.try_get("id")?,
        assessment_id: row.try_get("assessment_id")?,
        format: parse(row.try_get::<String, _>("format")?)?,
        kind: parse(row.try_get::<String, _>("kind")?)?,
        file_name: row.try_get("file_name")?,
        artifact_path: row.try_get("artifact_path")?,
        size_bytes: row.try_get::<i64, _>("size_bytes")? as u64,
        note: row.try_get("note")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_job(row: &PgRow) -> StoreResult<JobRecord> {
    Ok(JobRecord {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        benchmark: parse(row.try_get::<String, _>("benchmark")?)?,
        assessment_name: row.try_get("assessment_name")?,
        triggered_by: parse(row.try_get::<String, _>("triggered_by")?)?,
        parameters: row.try_get("parameters")?,
        priority: row.try_get("priority")?,
        status: parse(row.try_get::<String, _>("status")?)?,
        attempts: row.try_get("attempts")?,
        max_attempts: row.try_get("max_attempts")?,
        backoff_base_secs: row.try_get::<i64, _>("backoff_base_secs")? as u64,
        run_at: row.try_get("run_at")?,
        progress: row.try_get::<i16, _>("progress")? as u8,
        cancel_requested: row.try_get("cancel_requested")?,
        assessment_id: row.try_get("assessment_id")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct PgTenantRepository {
    pool: PgPool,
}

impl PgTenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantRepository for PgTenantRepository {
    async fn insert(&self, tenant: &Tenant) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO maes.tenants \
             (id, name, directory_tenant_id, domain, credentials, active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(tenant.id)
        .bind(&tenant.name)
        .bind(&tenant.directory_tenant_id)
        .bind(&tenant.domain)
        .bind(serde_json::to_value(&tenant.credentials).unwrap_or(Value::Null))
        .bind(tenant.active)
        .bind(tenant.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Tenant>> {
        let row = sqlx::query("SELECT * FROM maes.tenants WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_tenant).transpose()
    }

    async fn list_active(&self) -> StoreResult<Vec<Tenant>> {
        let rows = sqlx::query("SELECT * FROM maes.tenants WHERE active ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_tenant).collect()
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM maes.tenants WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct PgAssessmentRepository {
    pool: PgPool,
}

impl PgAssessmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssessmentRepository for PgAssessmentRepository {
    async fn insert(&self, a: &Assessment) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO maes.assessments \
             (id, tenant_id, benchmark, name, triggered_by, status, progress, \
              total, compliant, non_compliant, manual_review, not_applicable, error_count, \
              overall_score, weighted_score, started_at, completed_at, duration_seconds, \
              error_message, parameters, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, \
                     $16, $17, $18, $19, $20, $21)",
        )
        .bind(a.id)
        .bind(a.tenant_id)
        .bind(a.benchmark.as_str())
        .bind(&a.name)
        .bind(a.triggered_by.to_string())
        .bind(a.status.as_str())
        .bind(a.progress as i16)
        .bind(a.totals.total as i32)
        .bind(a.totals.compliant as i32)
        .bind(a.totals.non_compliant as i32)
        .bind(a.totals.manual_review as i32)
        .bind(a.totals.not_applicable as i32)
        .bind(a.totals.error as i32)
        .bind(a.overall_score)
        .bind(a.weighted_score)
        .bind(a.started_at)
        .bind(a.completed_at)
        .bind(a.duration_seconds)
        .bind(&a.error_message)
        .bind(&a.parameters)
        .bind(a.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Assessment>> {
        let row = sqlx::query("SELECT * FROM maes.assessments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_assessment).transpose()
    }

    async fn list_for_tenant(&self, tenant_id: Uuid, limit: usize) -> StoreResult<Vec<Assessment>> {
        let rows = sqlx::query(
            "SELECT * FROM maes.assessments WHERE tenant_id = $1 \
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(tenant_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_assessment).collect()
    }

    async fn mark_running(
        &self,
        id: Uuid,
        started_at: DateTime<Utc>,
        progress: u8,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE maes.assessments \
             SET status = 'running', started_at = $2, progress = GREATEST(progress, $3) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(started_at)
        .bind(progress as i16)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn merge_parameters(&self, id: Uuid, patch: &Value) -> StoreResult<()> {
        sqlx::query(
            "UPDATE maes.assessments \
             SET parameters = CASE \
                 WHEN jsonb_typeof(parameters) = 'object' AND jsonb_typeof($2::jsonb) = 'object' \
                 THEN parameters || $2::jsonb ELSE $2::jsonb END \
             WHERE id = $1",
        )
        .bind(id)
        .bind(patch)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn bump_progress(&self, id: Uuid, progress: u8) -> StoreResult<()> {
        // Monotonic under concurrent readers.
        sqlx::query("UPDATE maes.assessments SET progress = $2 WHERE id = $1 AND progress < $2")
            .bind(id)
            .bind(progress as i16)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn finalize(&self, a: &Assessment) -> StoreResult<()> {
        sqlx::query(
            "UPDATE maes.assessments SET \
             status = $2, progress = $3, total = $4, compliant = $5, non_compliant = $6, \
             manual_review = $7, not_applicable = $8, error_count = $9, overall_score = $10, \
             weighted_score = $11, completed_at = $12, duration_seconds = $13, error_message = $14 \
             WHERE id = $1",
        )
        .bind(a.id)
        .bind(a.status.as_str())
        .bind(a.progress as i16)
        .bind(a.totals.total as i32)
        .bind(a.totals.compliant as i32)
        .bind(a.totals.non_compliant as i32)
        .bind(a.totals.manual_review as i32)
        .bind(a.totals.not_applicable as i32)
        .bind(a.totals.error as i32)
        .bind(a.overall_score)
        .bind(a.weighted_score)
        .bind(a.completed_at)
        .bind(a.duration_seconds)
        .bind(&a.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PgControlResultRepository {
    pool: PgPool,
}

impl PgControlResultRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ControlResultRepository for PgControlResultRepository {
    async fn upsert(&self, r: &ControlResult) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO maes.control_results \
             (id, assessment_id, control_id, status, score, actual, evidence, \
              remediation, error_message, checked_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (assessment_id, control_id) DO UPDATE SET \
             status = EXCLUDED.status, score = EXCLUDED.score, actual = EXCLUDED.actual, \
             evidence = EXCLUDED.evidence, remediation = EXCLUDED.remediation, \
             error_message = EXCLUDED.error_message, checked_at = EXCLUDED.checked_at",
        )
        .bind(r.id)
        .bind(r.assessment_id)
        .bind(&r.control_id)
        .bind(r.status.as_str())
        .bind(r.score)
        .bind(&r.actual)
        .bind(&r.evidence)
        .bind(&r.remediation)
        .bind(&r.error_message)
        .bind(r.checked_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_assessment(&self, assessment_id: Uuid) -> StoreResult<Vec<ControlResult>> {
        let rows = sqlx::query(
            "SELECT * FROM maes.control_results WHERE assessment_id = $1 ORDER BY control_id",
        )
        .bind(assessment_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_result).collect()
    }
}

pub struct PgScheduleRepository {
    pool: PgPool,
}

impl PgScheduleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleRepository for PgScheduleRepository {
    async fn insert(&self, s: &Schedule) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO maes.schedules \
             (id, tenant_id, name, benchmark, frequency, active, next_run_at, last_run_at, \
              last_assessment_id, parameters, created_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(s.id)
        .bind(s.tenant_id)
        .bind(&s.name)
        .bind(s.benchmark.as_str())
        .bind(s.frequency.as_str())
        .bind(s.active)
        .bind(s.next_run_at)
        .bind(s.last_run_at)
        .bind(s.last_assessment_id)
        .bind(&s.parameters)
        .bind(&s.created_by)
        .bind(s.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, s: &Schedule) -> StoreResult<()> {
        sqlx::query(
            "UPDATE maes.schedules SET \
             name = $2, benchmark = $3, frequency = $4, active = $5, next_run_at = $6, \
             last_run_at = $7, last_assessment_id = $8, parameters = $9 \
             WHERE id = $1",
        )
        .bind(s.id)
        .bind(&s.name)
        .bind(s.benchmark.as_str())
        .bind(s.frequency.as_str())
        .bind(s.active)
        .bind(s.next_run_at)
        .bind(s.last_run_at)
        .bind(s.last_assessment_id)
        .bind(&s.parameters)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM maes.schedules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Schedule>> {
        let row = sqlx::query("SELECT * FROM maes.schedules WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_schedule).transpose()
    }

    async fn list_for_tenant(&self, tenant_id: Uuid) -> StoreResult<Vec<Schedule>> {
        let rows =
            sqlx::query("SELECT * FROM maes.schedules WHERE tenant_id = $1 ORDER BY created_at")
                .bind(tenant_id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(map_schedule).collect()
    }

    async fn list_active(&self) -> StoreResult<Vec<Schedule>> {
        let rows = sqlx::query("SELECT * FROM maes.schedules WHERE active")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_schedule).collect()
    }

    async fn list_overdue(&self, now: DateTime<Utc>) -> StoreResult<Vec<Schedule>> {
        let rows = sqlx::query(
            "SELECT * FROM maes.schedules WHERE active AND next_run_at IS NOT NULL \
             AND next_run_at < $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_schedule).collect()
    }

    async fn mark_fired(
        &self,
        id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE maes.schedules SET last_run_at = $2, next_run_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(last_run_at)
        .bind(next_run_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_last_assessment(&self, id: Uuid, assessment_id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE maes.schedules SET last_assessment_id = $2 WHERE id = $1")
            .bind(id)
            .bind(assessment_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct PgReportRepository {
    pool: PgPool,
}

impl PgReportRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportRepository for PgReportRepository {
    async fn insert(&self, r: &ReportArtifact) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO maes.reports \
             (id, assessment_id, format, kind, file_name, artifact_path, size_bytes, note, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(r.id)
        .bind(r.assessment_id)
        .bind(r.format.as_str())
        .bind(r.kind.as_str())
        .bind(&r.file_name)
        .bind(&r.artifact_path)
        .bind(r.size_bytes as i64)
        .bind(&r.note)
        .bind(r.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_assessment(&self, assessment_id: Uuid) -> StoreResult<Vec<ReportArtifact>> {
        let rows = sqlx::query(
            "SELECT * FROM maes.reports WHERE assessment_id = $1 ORDER BY created_at DESC",
        )
        .bind(assessment_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_report).collect()
    }

    async fn find_by_file_name(
        &self,
        assessment_id: Uuid,
        file_name: &str,
    ) -> StoreResult<Option<ReportArtifact>> {
        let row = sqlx::query(
            "SELECT * FROM maes.reports WHERE assessment_id = $1 AND file_name = $2",
        )
        .bind(assessment_id)
        .bind(file_name)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(map_report).transpose()
    }
}

pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn insert(&self, j: &JobRecord) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO maes.jobs \
             (id, tenant_id, benchmark, assessment_name, triggered_by, parameters, priority, \
              status, attempts, max_attempts, backoff_base_secs, run_at, progress, \
              cancel_requested, assessment_id, error_message, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
        )
        .bind(j.id)
        .bind(j.tenant_id)
        .bind(j.benchmark.as_str())
        .bind(&j.assessment_name)
        .bind(j.triggered_by.to_string())
        .bind(&j.parameters)
        .bind(j.priority)
        .bind(j.status.as_str())
        .bind(j.attempts)
        .bind(j.max_attempts)
        .bind(j.backoff_base_secs as i64)
        .bind(j.run_at)
        .bind(j.progress as i16)
        .bind(j.cancel_requested)
        .bind(j.assessment_id)
        .bind(&j.error_message)
        .bind(j.created_at)
        .bind(j.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<JobRecord>> {
        let row = sqlx::query("SELECT * FROM maes.jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_job).transpose()
    }

    async fn find_by_assessment(&self, assessment_id: Uuid) -> StoreResult<Option<JobRecord>> {
        let row = sqlx::query("SELECT * FROM maes.jobs WHERE assessment_id = $1")
            .bind(assessment_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_job).transpose()
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> StoreResult<Option<JobRecord>> {
        let row = sqlx::query(
            "UPDATE maes.jobs SET status = 'running', attempts = attempts + 1, updated_at = $1 \
             WHERE id = (SELECT id FROM maes.jobs \
                         WHERE status = 'queued' AND run_at <= $1 \
                         ORDER BY priority ASC, created_at ASC, id ASC \
                         FOR UPDATE SKIP LOCKED LIMIT 1) \
             RETURNING *",
        )
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(map_job).transpose()
    }

    async fn set_progress(&self, id: Uuid, progress: u8) -> StoreResult<bool> {
        let row = sqlx::query(
            "UPDATE maes.jobs SET progress = GREATEST(progress, $2), updated_at = now() \
             WHERE id = $1 RETURNING cancel_requested",
        )
        .bind(id)
        .bind(progress as i16)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.try_get("cancel_requested")).transpose()?.unwrap_or(false))
    }

    async fn set_assessment(&self, id: Uuid, assessment_id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE maes.jobs SET assessment_id = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(assessment_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn complete(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query(
            "UPDATE maes.jobs SET status = 'completed', progress = 100, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn retry(&self, id: Uuid, error: &str, run_at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            "UPDATE maes.jobs SET status = 'queued', error_message = $2, run_at = $3, \
             updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .bind(run_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str) -> StoreResult<()> {
        sqlx::query(
            "UPDATE maes.jobs SET status = 'failed', error_message = $2, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn request_cancel(&self, id: Uuid) -> StoreResult<Option<JobStatus>> {
        let row = sqlx::query(
            "UPDATE maes.jobs SET cancel_requested = TRUE, \
             status = CASE WHEN status = 'queued' THEN 'cancelled' ELSE status END, \
             updated_at = now() \
             WHERE id = $1 RETURNING status",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(r) => Ok(Some(parse(r.try_get::<String, _>("status")?)?)),
            None => Ok(None),
        }
    }

    async fn mark_cancelled(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE maes.jobs SET status = 'cancelled', updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn counts(&self) -> StoreResult<JobCounts> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM maes.jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        let mut counts = JobCounts::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            match status.as_str() {
                "queued" => counts.queued = n as u64,
                "running" => counts.running = n as u64,
                "completed" => counts.completed = n as u64,
                "failed" => counts.failed = n as u64,
                "cancelled" => counts.cancelled = n as u64,
                _ => {}
            }
        }
        Ok(counts)
    }

    async fn prune(&self, now: DateTime<Utc>, policy: &RetentionPolicy) -> StoreResult<u64> {
        let mut deleted = 0u64;

        let done_cutoff = now - policy.completed_ttl;
        deleted += sqlx::query(
            "DELETE FROM maes.jobs \
             WHERE status IN ('completed', 'cancelled') AND updated_at < $1",
        )
        .bind(done_cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let failed_cutoff = now - policy.failed_ttl;
        deleted += sqlx::query("DELETE FROM maes.jobs WHERE status = 'failed' AND updated_at < $1")
            .bind(failed_cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        deleted += sqlx::query(
            "DELETE FROM maes.jobs WHERE id IN ( \
                 SELECT id FROM maes.jobs WHERE status IN ('completed', 'cancelled') \
                 ORDER BY updated_at DESC OFFSET $1)",
        )
        .bind(policy.max_completed as i64)
        .execute(&self.pool)
        .await?
        .rows_affected();

        deleted += sqlx::query(
            "DELETE FROM maes.jobs WHERE id IN ( \
                 SELECT id FROM maes.jobs WHERE status = 'failed' \
                 ORDER BY updated_at DESC OFFSET $1)",
        )
        .bind(policy.max_failed as i64)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(deleted)
    }
}
