//! Report generation
//!
//! Materializes completed assessments into JSON, CSV, HTML and PDF
//! artifacts under `reports/`, with executive summaries, deterministic
//! recommendations and age-based cleanup. Writes are temp-file plus
//! atomic rename.

pub mod csv;
pub mod html;
pub mod json;
pub mod model;
pub mod pdf;

use chrono::Utc;
use maes_catalog::ControlCatalog;
use maes_common::{
    Assessment, AssessmentStatus, CoreError, ReportArtifact, ReportFormat, ReportKind,
};
use maes_store::{Store, StoreError};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub use json::JsonReport;
pub use model::{Recommendation, RecommendationPriority, ReportModel};
pub use pdf::PdfRenderer;

/// Report generation failures
#[derive(Error, Debug)]
pub enum ReportError {
    /// The assessment has not completed
    #[error("not ready: assessment {0} is not completed")]
    NotReady(Uuid),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("render error: {0}")]
    Render(String),
    /// No headless browser; callers fall back to HTML
    #[error("pdf renderer unavailable")]
    PdfUnavailable,
}

impl From<ReportError> for CoreError {
    fn from(e: ReportError) -> Self {
        match e {
            ReportError::NotReady(id) => {
                CoreError::NotReady(format!("assessment {id} is not completed"))
            }
            ReportError::NotFound(m) => CoreError::NotFound(m),
            ReportError::Store(e) => e.into(),
            other => CoreError::Internal(other.to_string()),
        }
    }
}

/// Options accepted by [`ReportGenerator::generate`].
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ReportOptions {
    /// Override the document title; defaults to the assessment name.
    pub title: Option<String>,
}

/// Renders and catalogs report artifacts.
pub struct ReportGenerator {
    store: Store,
    catalog: Arc<ControlCatalog>,
    reports_dir: PathBuf,
    pdf: PdfRenderer,
}

impl ReportGenerator {
    pub fn new(store: Store, catalog: Arc<ControlCatalog>, reports_dir: impl Into<PathBuf>) -> Self {
        Self { store, catalog, reports_dir: reports_dir.into(), pdf: PdfRenderer::detect() }
    }

    pub fn with_pdf_renderer(mut self, pdf: PdfRenderer) -> Self {
        self.pdf = pdf;
        self
    }

    /// Generate one artifact for a completed assessment.
    pub async fn generate(
        &self,
        assessment_id: Uuid,
        format: ReportFormat,
        kind: ReportKind,
        options: ReportOptions,
    ) -> Result<ReportArtifact, ReportError> {
        let mut assessment = self
            .store
            .assessments
            .get(assessment_id)
            .await?
            .ok_or_else(|| ReportError::NotFound(format!("assessment {assessment_id}")))?;
        if assessment.status != AssessmentStatus::Completed {
            return Err(ReportError::NotReady(assessment_id));
        }
        if let Some(title) = options.title {
            assessment.name = title;
        }

        let results = self.store.results.list_for_assessment(assessment_id).await?;
        let model = ReportModel::build(assessment, &results, &self.catalog);

        tokio::fs::create_dir_all(&self.reports_dir).await?;
        let epoch_ms = Utc::now().timestamp_millis();

        let artifact = match format {
            ReportFormat::Json => {
                let bytes = json::render(&model, kind)
                    .map_err(|e| ReportError::Render(e.to_string()))?;
                self.persist(assessment_id, format, kind, epoch_ms, "json", bytes, None).await?
            }
            ReportFormat::Csv => {
                let bytes = csv::render(&model);
                self.persist(assessment_id, format, kind, epoch_ms, "csv", bytes, None).await?
            }
            ReportFormat::Html => {
                let bytes = html::render(&model, kind);
                self.persist(assessment_id, format, kind, epoch_ms, "html", bytes, None).await?
            }
            ReportFormat::Pdf => self.generate_pdf(&model, assessment_id, kind, epoch_ms).await?,
        };

        self.store.reports.insert(&artifact).await?;
        tracing::info!(
            assessment = %assessment_id,
            file = %artifact.file_name,
            format = artifact.format.as_str(),
            bytes = artifact.size_bytes,
            "report generated"
        );
        Ok(artifact)
    }

    /// PDF path: print the HTML through the headless browser; without one,
    /// ship the HTML with a note while still declaring `format = pdf` for
    /// the caller's bookkeeping.
    async fn generate_pdf(
        &self,
        model: &ReportModel,
        assessment_id: Uuid,
        kind: ReportKind,
        epoch_ms: i64,
    ) -> Result<ReportArtifact, ReportError> {
        let html_bytes = html::render(model, kind);
        let html_tmp = self.reports_dir.join(format!("{assessment_id}_{epoch_ms}.html.tmp"));
        tokio::fs::write(&html_tmp, &html_bytes).await?;

        let pdf_tmp = self.reports_dir.join(format!("{assessment_id}_{epoch_ms}.pdf.tmp"));
        match self.pdf.render(&html_tmp, &pdf_tmp).await {
            Ok(()) => {
                tokio::fs::remove_file(&html_tmp).await.ok();
                let file_name = format!("{assessment_id}_{epoch_ms}.pdf");
                let path = self.reports_dir.join(&file_name);
                tokio::fs::rename(&pdf_tmp, &path).await?;
                let size = tokio::fs::metadata(&path).await?.len();
                Ok(self.artifact(assessment_id, ReportFormat::Pdf, kind, file_name, path, size, None))
            }
            Err(ReportError::PdfUnavailable) => {
                let file_name = format!("{assessment_id}_{epoch_ms}.html");
                let path = self.reports_dir.join(&file_name);
                tokio::fs::rename(&html_tmp, &path).await?;
                Ok(self.artifact(
                    assessment_id,
                    ReportFormat::Pdf,
                    kind,
                    file_name,
                    path,
                    html_bytes.len() as u64,
                    Some("pdf renderer unavailable; html fallback generated".to_string()),
                ))
            }
            Err(e) => Err(e),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist(
        &self,
        assessment_id: Uuid,
        format: ReportFormat,
        kind: ReportKind,
        epoch_ms: i64,
        ext: &str,
        bytes: Vec<u8>,
        note: Option<String>,
    ) -> Result<ReportArtifact, ReportError> {
        let file_name = format!("{assessment_id}_{epoch_ms}.{ext}");
        let path = self.reports_dir.join(&file_name);
        let tmp = self.reports_dir.join(format!("{file_name}.tmp"));
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(self.artifact(assessment_id, format, kind, file_name, path, bytes.len() as u64, note))
    }

    #[allow(clippy::too_many_arguments)]
    fn artifact(
        &self,
        assessment_id: Uuid,
        format: ReportFormat,
        kind: ReportKind,
        file_name: String,
        path: PathBuf,
        size_bytes: u64,
        note: Option<String>,
    ) -> ReportArtifact {
        ReportArtifact {
            id: Uuid::new_v4(),
            assessment_id,
            format,
            kind,
            file_name,
            artifact_path: path.to_string_lossy().into_owned(),
            size_bytes,
            note,
            created_at: Utc::now(),
        }
    }

    /// Delete artifacts older than `max_age`; returns the removed count.
    pub async fn cleanup(&self, max_age: std::time::Duration) -> Result<u64, ReportError> {
        let mut deleted = 0u64;
        let mut dir = match tokio::fs::read_dir(&self.reports_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let old_enough = metadata
                .modified()
                .ok()
                .and_then(|m| m.elapsed().ok())
                .map(|age| age >= max_age)
                .unwrap_or(false);
            if old_enough {
                tokio::fs::remove_file(entry.path()).await?;
                deleted += 1;
            }
        }
        if deleted > 0 {
            tracing::info!(deleted, "report cleanup removed artifacts");
        }
        Ok(deleted)
    }

    pub async fn list(&self, assessment_id: Uuid) -> Result<Vec<ReportArtifact>, ReportError> {
        Ok(self.store.reports.list_for_assessment(assessment_id).await?)
    }

    pub async fn find(
        &self,
        assessment_id: Uuid,
        file_name: &str,
    ) -> Result<Option<ReportArtifact>, ReportError> {
        Ok(self.store.reports.find_by_file_name(assessment_id, file_name).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maes_common::{Benchmark, ControlResult, ControlStatus, Severity, Totals, TriggeredBy};
    use serde_json::{json, Value};

    fn controls() -> Vec<maes_common::ControlDefinition> {
        let control = |id: &str, section: &str, severity, weight| maes_common::ControlDefinition {
            id: id.into(),
            benchmark: Benchmark::Custom,
            section: section.into(),
            title: format!("Control {id}, with a comma"),
            description: String::new(),
            rationale: String::new(),
            remediation: "remediate".into(),
            severity,
            weight,
            expected: Value::Null,
            checker_key: "k".into(),
            active: true,
        };
        vec![
            control("1.1.1", "1.1 Admin Roles", Severity::Level2, 1.0),
            control("1.2.1", "1.2 Conditional Access", Severity::Level1, 1.0),
            control("8.2.2", "8.2 Teams", Severity::Level1, 0.5),
        ]
    }

    async fn fixture() -> (ReportGenerator, Store, Uuid, PathBuf) {
        let store = Store::in_memory();
        let dir = std::env::temp_dir().join(format!("maes-report-test-{}", Uuid::new_v4()));

        let mut assessment = Assessment::new(
            Uuid::new_v4(),
            Benchmark::Custom,
            "Quarterly run".into(),
            TriggeredBy::Api,
            Value::Null,
        );
        assessment.status = AssessmentStatus::Completed;
        assessment.progress = 100;
        assessment.totals = Totals {
            total: 3,
            compliant: 1,
            non_compliant: 1,
            manual_review: 1,
            not_applicable: 0,
            error: 0,
        };
        assessment.overall_score = 50.0;
        assessment.weighted_score = 60.0;
        let id = assessment.id;
        store.assessments.insert(&assessment).await.unwrap();

        let result = |control_id: &str, status, score| ControlResult {
            id: Uuid::new_v4(),
            assessment_id: id,
            control_id: control_id.into(),
            status,
            score,
            actual: json!({"observed": control_id}),
            evidence: Value::Null,
            remediation: Some("remediate".into()),
            error_message: None,
            checked_at: Utc::now(),
        };
        for r in [
            result("1.1.1", ControlStatus::NonCompliant, 33.33),
            result("1.2.1", ControlStatus::Compliant, 100.0),
            result("8.2.2", ControlStatus::ManualReview, 0.0),
        ] {
            store.results.upsert(&r).await.unwrap();
        }

        let generator = ReportGenerator::new(
            store.clone(),
            Arc::new(ControlCatalog::from_controls(controls())),
            &dir,
        )
        .with_pdf_renderer(PdfRenderer::disabled());
        (generator, store, id, dir)
    }

    #[tokio::test]
    async fn refuses_incomplete_assessments() {
        let (generator, store, _id, _dir) = fixture().await;
        let mut running = Assessment::new(
            Uuid::new_v4(),
            Benchmark::Custom,
            "in flight".into(),
            TriggeredBy::Api,
            Value::Null,
        );
        running.status = AssessmentStatus::Running;
        store.assessments.insert(&running).await.unwrap();

        match generator
            .generate(running.id, ReportFormat::Json, ReportKind::Full, ReportOptions::default())
            .await
        {
            Err(ReportError::NotReady(id)) => assert_eq!(id, running.id),
            other => panic!("expected not ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn csv_has_one_data_row_per_control() {
        let (generator, _store, id, _dir) = fixture().await;
        let artifact = generator
            .generate(id, ReportFormat::Csv, ReportKind::Full, ReportOptions::default())
            .await
            .unwrap();

        let content = tokio::fs::read_to_string(&artifact.artifact_path).await.unwrap();
        let lines: Vec<&str> = content.lines().filter(|l| !l.is_empty()).collect();
        assert_eq!(lines[0], csv::HEADER);
        assert_eq!(lines.len() as u32 - 1, 3);
        // The comma-bearing title was quoted.
        assert!(content.contains("\"Control 1.1.1, with a comma\""));
    }

    #[tokio::test]
    async fn json_report_round_trips() {
        let (generator, _store, id, _dir) = fixture().await;
        let artifact = generator
            .generate(id, ReportFormat::Json, ReportKind::Full, ReportOptions::default())
            .await
            .unwrap();

        let bytes = tokio::fs::read(&artifact.artifact_path).await.unwrap();
        let parsed: JsonReport = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(parsed.metadata.assessment_id, id);
        assert_eq!(parsed.summary.overall_score, 50.0);
        assert_eq!(parsed.summary.weighted_score, 60.0);
        assert_eq!(parsed.summary.totals.total, 3);

        let tuples: Vec<(String, ControlStatus, f64)> = parsed
            .controls
            .iter()
            .map(|c| (c.control_id.clone(), c.status, c.score))
            .collect();
        assert_eq!(
            tuples,
            vec![
                ("1.1.1".to_string(), ControlStatus::NonCompliant, 33.33),
                ("1.2.1".to_string(), ControlStatus::Compliant, 100.0),
                ("8.2.2".to_string(), ControlStatus::ManualReview, 0.0),
            ]
        );
    }

    #[tokio::test]
    async fn html_carries_the_visible_sections() {
        let (generator, _store, id, _dir) = fixture().await;
        let artifact = generator
            .generate(id, ReportFormat::Html, ReportKind::Full, ReportOptions::default())
            .await
            .unwrap();

        let content = tokio::fs::read_to_string(&artifact.artifact_path).await.unwrap();
        assert!(content.contains("Overall score"));
        assert!(content.contains("Critical findings"));
        assert!(content.contains("Compliance by section"));
        assert!(content.contains("id=\"results\""));
        assert!(content.contains("Recommendations"));
        // The level2 non-compliant control shows up as a critical finding.
        assert!(content.contains("1.1.1"));
    }

    #[tokio::test]
    async fn executive_html_omits_the_results_table() {
        let (generator, _store, id, _dir) = fixture().await;
        let artifact = generator
            .generate(id, ReportFormat::Html, ReportKind::Executive, ReportOptions::default())
            .await
            .unwrap();
        let content = tokio::fs::read_to_string(&artifact.artifact_path).await.unwrap();
        assert!(!content.contains("id=\"results\""));
        assert!(content.contains("Overall score"));
    }

    #[tokio::test]
    async fn pdf_falls_back_to_html_with_a_note() {
        let (generator, _store, id, _dir) = fixture().await;
        let artifact = generator
            .generate(id, ReportFormat::Pdf, ReportKind::Full, ReportOptions::default())
            .await
            .unwrap();

        assert_eq!(artifact.format, ReportFormat::Pdf);
        assert!(artifact.note.is_some());
        assert!(artifact.file_name.ends_with(".html"));
        assert!(tokio::fs::metadata(&artifact.artifact_path).await.unwrap().is_file());
    }

    #[tokio::test]
    async fn artifacts_are_cataloged_and_named_by_assessment() {
        let (generator, store, id, _dir) = fixture().await;
        let artifact = generator
            .generate(id, ReportFormat::Json, ReportKind::Full, ReportOptions::default())
            .await
            .unwrap();
        assert!(artifact.file_name.starts_with(&id.to_string()));

        let listed = store.reports.list_for_assessment(id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].file_name, artifact.file_name);
        let found = store.reports.find_by_file_name(id, &artifact.file_name).await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn cleanup_removes_aged_artifacts() {
        let (generator, _store, id, dir) = fixture().await;
        generator
            .generate(id, ReportFormat::Csv, ReportKind::Full, ReportOptions::default())
            .await
            .unwrap();

        // Nothing is old enough yet.
        assert_eq!(generator.cleanup(std::time::Duration::from_secs(3600)).await.unwrap(), 0);
        // Zero max-age sweeps everything.
        assert_eq!(generator.cleanup(std::time::Duration::ZERO).await.unwrap(), 1);
        let mut entries = tokio::fs::read_dir(&dir).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }
}
