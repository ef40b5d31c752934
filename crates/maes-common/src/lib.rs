//! MAES Compliance Core - shared domain model
//!
//! Entities, error taxonomy, scoring primitives and environment
//! configuration shared by every other crate in the workspace.

pub mod config;
pub mod error;
pub mod job;
pub mod model;
pub mod scoring;

pub use config::CoreConfig;
pub use error::{AuthCause, CoreError, CoreResult};
pub use model::{
    Assessment, AssessmentStatus, Benchmark, ControlDefinition, ControlResult, ControlStatus,
    Credentials, Frequency, ReportArtifact, ReportFormat, ReportKind, Schedule, Severity, Tenant,
    Totals, TriggeredBy,
};
