//! Report endpoints

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use maes_common::{CoreError, ReportArtifact};
use uuid::Uuid;

use crate::models::GenerateReportRequest;
use crate::{ApiResult, ApiState};

/// Generate and catalog an artifact for a completed assessment.
pub async fn generate(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(request): Json<GenerateReportRequest>,
) -> ApiResult<Json<ReportArtifact>> {
    let artifact = state
        .reports
        .generate(id, request.format, request.kind, request.options)
        .await?;
    Ok(Json(artifact))
}

/// List generated artifacts.
pub async fn list(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<ReportArtifact>>> {
    state
        .store
        .assessments
        .get(id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("assessment {id}")))?;
    Ok(Json(state.reports.list(id).await?))
}

fn content_type_for(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next() {
        Some("html") => "text/html",
        Some("json") => "application/json",
        Some("csv") => "text/csv",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Stream one artifact; 404 when missing from the catalog or from disk.
pub async fn download(
    State(state): State<ApiState>,
    Path((id, file_name)): Path<(Uuid, String)>,
) -> ApiResult<Response> {
    let artifact = state
        .reports
        .find(id, &file_name)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("report {file_name}")))?;

    let bytes = tokio::fs::read(&artifact.artifact_path).await.map_err(|_| {
        CoreError::NotFound(format!("artifact {file_name} is missing on disk"))
    })?;

    // Content type follows the bytes on disk (a PDF fallback ships HTML).
    let response = (
        [
            (header::CONTENT_TYPE, content_type_for(&artifact.file_name)),
            (header::CONTENT_DISPOSITION, "attachment"),
        ],
        bytes,
    );
    Ok(response.into_response())
}
