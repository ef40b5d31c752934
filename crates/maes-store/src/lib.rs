//! Persistence layer
//!
//! Repository traits over the `maes` schema, with a Postgres
//! implementation for deployment and an in-memory implementation for
//! tests and single-process development.

pub mod memory;
pub mod pg;
pub mod repo;

use maes_common::CoreError;
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;

pub use repo::{
    AssessmentRepository, ControlResultRepository, JobCounts, JobRepository, ReportRepository,
    RetentionPolicy, ScheduleRepository, TenantRepository,
};

/// Persistence error
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => StoreError::NotFound(e.to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(e.to_string())
            }
            _ => StoreError::Database(e.to_string()),
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(m) => CoreError::NotFound(m),
            StoreError::Conflict(m) => CoreError::Conflict(m),
            StoreError::Database(m) => CoreError::Internal(m),
        }
    }
}

/// Result type of the persistence layer
pub type StoreResult<T> = Result<T, StoreError>;

/// Bundle of the repositories one process works against.
#[derive(Clone)]
pub struct Store {
    pub tenants: Arc<dyn TenantRepository>,
    pub assessments: Arc<dyn AssessmentRepository>,
    pub results: Arc<dyn ControlResultRepository>,
    pub schedules: Arc<dyn ScheduleRepository>,
    pub reports: Arc<dyn ReportRepository>,
    pub jobs: Arc<dyn JobRepository>,
}

impl Store {
    /// All repositories backed by process-local memory.
    pub fn in_memory() -> Self {
        Self {
            tenants: Arc::new(memory::InMemoryTenantRepository::default()),
            assessments: Arc::new(memory::InMemoryAssessmentRepository::default()),
            results: Arc::new(memory::InMemoryControlResultRepository::default()),
            schedules: Arc::new(memory::InMemoryScheduleRepository::default()),
            reports: Arc::new(memory::InMemoryReportRepository::default()),
            jobs: Arc::new(memory::InMemoryJobRepository::default()),
        }
    }

    /// All repositories over one Postgres pool.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            tenants: Arc::new(pg::PgTenantRepository::new(pool.clone())),
            assessments: Arc::new(pg::PgAssessmentRepository::new(pool.clone())),
            results: Arc::new(pg::PgControlResultRepository::new(pool.clone())),
            schedules: Arc::new(pg::PgScheduleRepository::new(pool.clone())),
            reports: Arc::new(pg::PgReportRepository::new(pool.clone())),
            jobs: Arc::new(pg::PgJobRepository::new(pool)),
        }
    }

    /// Connect, apply the schema migration, and return the bundle.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        pg::run_migrations(&pool).await?;
        Ok(Self::postgres(pool))
    }
}
