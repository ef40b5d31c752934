//! Core entities: tenants, controls, assessments, schedules, reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Evidence payloads persisted on a control result are capped at this size.
pub const EVIDENCE_MAX_BYTES: usize = 64 * 1024;

/// Benchmark catalog identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Benchmark {
    CisV3,
    CisV4,
    Custom,
}

impl Benchmark {
    /// Canonical string form, also used as the database encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Benchmark::CisV3 => "cisV3",
            Benchmark::CisV4 => "cisV4",
            Benchmark::Custom => "custom",
        }
    }
}

impl fmt::Display for Benchmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Benchmark {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cisV3" => Ok(Benchmark::CisV3),
            "cisV4" => Ok(Benchmark::CisV4),
            "custom" => Ok(Benchmark::Custom),
            other => Err(format!("unknown benchmark: {other}")),
        }
    }
}

/// CIS profile level of a control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Level1,
    Level2,
}

impl Severity {
    /// Weight multiplier applied in the weighted score.
    pub fn multiplier(&self) -> f64 {
        match self {
            Severity::Level1 => 1.0,
            Severity::Level2 => 1.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Level1 => "level1",
            Severity::Level2 => "level2",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "level1" => Ok(Severity::Level1),
            "level2" => Ok(Severity::Level2),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Credentials attached to a tenant.
///
/// The certificate body is never stored here; only a path or key-store
/// reference to the PEM material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Credentials {
    Secret {
        client_id: String,
        client_secret: String,
    },
    Certificate {
        client_id: String,
        key_path: String,
        cert_path: String,
    },
}

impl Credentials {
    pub fn client_id(&self) -> &str {
        match self {
            Credentials::Secret { client_id, .. } => client_id,
            Credentials::Certificate { client_id, .. } => client_id,
        }
    }
}

/// External-identity record for a Microsoft 365 tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    /// Entra directory (tenant) id used against the token endpoint
    pub directory_tenant_id: String,
    pub domain: String,
    pub credentials: Credentials,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// One control of a benchmark
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlDefinition {
    /// Stable dotted id, e.g. "1.1.1"
    pub id: String,
    pub benchmark: Benchmark,
    pub section: String,
    pub title: String,
    pub description: String,
    pub rationale: String,
    pub remediation: String,
    pub severity: Severity,
    /// Relative weight, default 1.0
    pub weight: f64,
    /// Structured expected result the checker compares against
    pub expected: Value,
    /// Binding into the checker registry
    pub checker_key: String,
    pub active: bool,
}

/// Outcome status of one control evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlStatus {
    Compliant,
    NonCompliant,
    ManualReview,
    NotApplicable,
    Error,
}

impl ControlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlStatus::Compliant => "compliant",
            ControlStatus::NonCompliant => "nonCompliant",
            ControlStatus::ManualReview => "manualReview",
            ControlStatus::NotApplicable => "notApplicable",
            ControlStatus::Error => "error",
        }
    }
}

impl FromStr for ControlStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compliant" => Ok(ControlStatus::Compliant),
            "nonCompliant" => Ok(ControlStatus::NonCompliant),
            "manualReview" => Ok(ControlStatus::ManualReview),
            "notApplicable" => Ok(ControlStatus::NotApplicable),
            "error" => Ok(ControlStatus::Error),
            other => Err(format!("unknown control status: {other}")),
        }
    }
}

/// Assessment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssessmentStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl AssessmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssessmentStatus::Completed | AssessmentStatus::Failed | AssessmentStatus::Cancelled
        )
    }

    /// Valid transitions: pending → running → {completed|failed};
    /// cancel is reachable from pending and running.
    pub fn can_transition(&self, to: AssessmentStatus) -> bool {
        use AssessmentStatus::*;
        matches!(
            (self, to),
            (Pending, Running) | (Running, Completed) | (Running, Failed)
                | (Pending, Cancelled) | (Running, Cancelled)
                | (Pending, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentStatus::Pending => "pending",
            AssessmentStatus::Running => "running",
            AssessmentStatus::Completed => "completed",
            AssessmentStatus::Failed => "failed",
            AssessmentStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for AssessmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AssessmentStatus::Pending),
            "running" => Ok(AssessmentStatus::Running),
            "completed" => Ok(AssessmentStatus::Completed),
            "failed" => Ok(AssessmentStatus::Failed),
            "cancelled" => Ok(AssessmentStatus::Cancelled),
            other => Err(format!("unknown assessment status: {other}")),
        }
    }
}

/// Per-status tallies of an assessment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub total: u32,
    pub compliant: u32,
    pub non_compliant: u32,
    pub manual_review: u32,
    pub not_applicable: u32,
    pub error: u32,
}

impl Totals {
    /// Record one result and keep `total` in sync.
    pub fn record(&mut self, status: ControlStatus) {
        self.total += 1;
        match status {
            ControlStatus::Compliant => self.compliant += 1,
            ControlStatus::NonCompliant => self.non_compliant += 1,
            ControlStatus::ManualReview => self.manual_review += 1,
            ControlStatus::NotApplicable => self.not_applicable += 1,
            ControlStatus::Error => self.error += 1,
        }
    }

    /// Sum of the per-status tallies; equals `total` by construction.
    pub fn sum(&self) -> u32 {
        self.compliant + self.non_compliant + self.manual_review + self.not_applicable + self.error
    }
}

/// What triggered an assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggeredBy {
    User(Uuid),
    Schedule(Uuid),
    Api,
}

impl fmt::Display for TriggeredBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggeredBy::User(id) => write!(f, "user:{id}"),
            TriggeredBy::Schedule(id) => write!(f, "schedule:{id}"),
            TriggeredBy::Api => f.write_str("api"),
        }
    }
}

impl FromStr for TriggeredBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "api" {
            return Ok(TriggeredBy::Api);
        }
        if let Some(id) = s.strip_prefix("user:") {
            return Uuid::parse_str(id)
                .map(TriggeredBy::User)
                .map_err(|e| format!("bad user id: {e}"));
        }
        if let Some(id) = s.strip_prefix("schedule:") {
            return Uuid::parse_str(id)
                .map(TriggeredBy::Schedule)
                .map_err(|e| format!("bad schedule id: {e}"));
        }
        Err(format!("unknown trigger: {s}"))
    }
}

impl Serialize for TriggeredBy {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TriggeredBy {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One execution of a benchmark against one tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub benchmark: Benchmark,
    pub name: String,
    pub triggered_by: TriggeredBy,
    pub status: AssessmentStatus,
    /// 0..100, non-decreasing while running
    pub progress: u8,
    pub totals: Totals,
    pub overall_score: f64,
    pub weighted_score: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub error_message: Option<String>,
    /// Run parameters and capability-probe outcome
    pub parameters: Value,
    pub created_at: DateTime<Utc>,
}

impl Assessment {
    /// Fresh pending assessment.
    pub fn new(
        tenant_id: Uuid,
        benchmark: Benchmark,
        name: String,
        triggered_by: TriggeredBy,
        parameters: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            benchmark,
            name,
            triggered_by,
            status: AssessmentStatus::Pending,
            progress: 0,
            totals: Totals::default(),
            overall_score: 0.0,
            weighted_score: 0.0,
            started_at: None,
            completed_at: None,
            duration_seconds: None,
            error_message: None,
            parameters,
            created_at: Utc::now(),
        }
    }
}

/// Outcome of one checker on one assessment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResult {
    pub id: Uuid,
    pub assessment_id: Uuid,
    pub control_id: String,
    pub status: ControlStatus,
    /// 0..100
    pub score: f64,
    pub actual: Value,
    /// Bounded by [`EVIDENCE_MAX_BYTES`], see [`bound_evidence`]
    pub evidence: Value,
    pub remediation: Option<String>,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Recurrence of a schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
        }
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "quarterly" => Ok(Frequency::Quarterly),
            other => Err(format!("unknown frequency: {other}")),
        }
    }
}

/// Recurring assessment rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub benchmark: Benchmark,
    pub frequency: Frequency,
    pub active: bool,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_assessment_id: Option<Uuid>,
    pub parameters: Value,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Artifact format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReportFormat {
    Html,
    Json,
    Csv,
    Pdf,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Html => "html",
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
            ReportFormat::Pdf => "pdf",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Html => "text/html",
            ReportFormat::Json => "application/json",
            ReportFormat::Csv => "text/csv",
            ReportFormat::Pdf => "application/pdf",
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.extension()
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "html" => Ok(ReportFormat::Html),
            "json" => Ok(ReportFormat::Json),
            "csv" => Ok(ReportFormat::Csv),
            "pdf" => Ok(ReportFormat::Pdf),
            other => Err(format!("unknown report format: {other}")),
        }
    }
}

/// Full results or executive summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReportKind {
    Full,
    Executive,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Full => "full",
            ReportKind::Executive => "executive",
        }
    }
}

impl FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(ReportKind::Full),
            "executive" => Ok(ReportKind::Executive),
            other => Err(format!("unknown report kind: {other}")),
        }
    }
}

/// Materialized report artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportArtifact {
    pub id: Uuid,
    pub assessment_id: Uuid,
    pub format: ReportFormat,
    pub kind: ReportKind,
    pub file_name: String,
    pub artifact_path: String,
    pub size_bytes: u64,
    /// Set when the requested format was degraded (e.g. PDF fallback)
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Cap an evidence payload at [`EVIDENCE_MAX_BYTES`].
///
/// Oversized payloads are replaced by a marker object carrying a bounded
/// preview of the serialized form.
pub fn bound_evidence(value: Value) -> Value {
    let serialized = value.to_string();
    if serialized.len() <= EVIDENCE_MAX_BYTES {
        return value;
    }
    let mut cut = EVIDENCE_MAX_BYTES / 2;
    while cut > 0 && !serialized.is_char_boundary(cut) {
        cut -= 1;
    }
    serde_json::json!({
        "truncated": true,
        "original_bytes": serialized.len(),
        "preview": &serialized[..cut],
    })
}
