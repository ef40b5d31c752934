//! Assessment job records carried by the durable queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use uuid::Uuid;

use crate::model::{Benchmark, TriggeredBy};

/// Default attempts before a job dead-letters.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;
/// Backoff base for API-triggered jobs.
pub const BACKOFF_BASE_SECS: u64 = 5;
/// Backoff base for scheduled jobs.
pub const BACKOFF_BASE_SECS_SCHEDULED: u64 = 10;
/// Queue priority assigned to scheduled runs; lower wins.
pub const SCHEDULED_PRIORITY: i16 = 5;
/// Queue priority assigned to ad-hoc API runs.
pub const DEFAULT_PRIORITY: i16 = 10;

/// Queue lifecycle of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Enqueue request for an assessment run
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub tenant_id: Uuid,
    pub benchmark: Benchmark,
    pub assessment_name: String,
    pub triggered_by: TriggeredBy,
    pub parameters: Value,
    pub priority: i16,
    /// Scheduled runs back off more conservatively
    pub scheduled: bool,
}

impl JobSpec {
    pub fn new(
        tenant_id: Uuid,
        benchmark: Benchmark,
        assessment_name: impl Into<String>,
        triggered_by: TriggeredBy,
    ) -> Self {
        Self {
            tenant_id,
            benchmark,
            assessment_name: assessment_name.into(),
            triggered_by,
            parameters: Value::Null,
            priority: DEFAULT_PRIORITY,
            scheduled: false,
        }
    }

    pub fn scheduled(mut self) -> Self {
        self.priority = SCHEDULED_PRIORITY;
        self.scheduled = true;
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Durable queue row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub benchmark: Benchmark,
    pub assessment_name: String,
    pub triggered_by: TriggeredBy,
    pub parameters: Value,
    /// Lower numeric priority wins; FIFO within equal priority
    pub priority: i16,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub backoff_base_secs: u64,
    /// Earliest instant the job may be picked up
    pub run_at: DateTime<Utc>,
    pub progress: u8,
    /// Cooperative cancellation flag; pickup and progress writes observe it
    pub cancel_requested: bool,
    /// Set once the engine created the assessment row; the idempotence key
    pub assessment_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Materialize a queue row from an enqueue request.
    pub fn from_spec(spec: JobSpec, now: DateTime<Utc>) -> Self {
        let backoff_base_secs = if spec.scheduled {
            BACKOFF_BASE_SECS_SCHEDULED
        } else {
            BACKOFF_BASE_SECS
        };
        Self {
            id: Uuid::new_v4(),
            tenant_id: spec.tenant_id,
            benchmark: spec.benchmark,
            assessment_name: spec.assessment_name,
            triggered_by: spec.triggered_by,
            parameters: spec.parameters,
            priority: spec.priority,
            status: JobStatus::Queued,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_secs,
            run_at: now,
            progress: 0,
            cancel_requested: false,
            assessment_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Exponential backoff delay after `attempts` failed tries (factor 2).
    pub fn backoff_delay_secs(&self) -> u64 {
        self.backoff_base_secs * 2u64.saturating_pow(self.attempts.saturating_sub(1).max(0) as u32)
    }
}
