//! Assessment comparison endpoint

use axum::extract::{Path, State};
use axum::Json;
use maes_engine::AssessmentDiff;
use uuid::Uuid;

use crate::{ApiResult, ApiState};

/// Diff two completed assessments.
pub async fn compare(
    State(state): State<ApiState>,
    Path((baseline_id, current_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<AssessmentDiff>> {
    let diff = state.comparator.compare(baseline_id, current_id).await?;
    Ok(Json(diff))
}
