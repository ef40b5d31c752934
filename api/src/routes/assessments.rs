//! Assessment endpoints

use axum::extract::{Path, State};
use axum::Json;
use maes_common::CoreError;
use maes_store::JobCounts;
use uuid::Uuid;

use crate::models::{
    AssessmentDetail, CancelResponse, StartAssessmentRequest, StartAssessmentResponse,
};
use crate::{ApiResult, ApiState};

/// Enqueue an assessment run.
pub async fn start(
    State(state): State<ApiState>,
    Json(request): Json<StartAssessmentRequest>,
) -> ApiResult<Json<StartAssessmentResponse>> {
    let tenant = state
        .store
        .tenants
        .get(request.tenant_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("tenant {}", request.tenant_id)))?;
    if !tenant.active {
        return Err(CoreError::Invalid(format!("tenant {} is inactive", tenant.id)).into());
    }

    let job_id = state.queue.enqueue(request.into_job_spec()).await?;
    Ok(Json(StartAssessmentResponse { job_id }))
}

/// Fetch an assessment together with its control results.
pub async fn get(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AssessmentDetail>> {
    let assessment = state
        .store
        .assessments
        .get(id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("assessment {id}")))?;
    let results = state.store.results.list_for_assessment(id).await?;
    Ok(Json(AssessmentDetail { assessment, results }))
}

/// Request cancellation of a queued or running assessment.
pub async fn cancel(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CancelResponse>> {
    let job = state
        .queue
        .find_by_assessment(id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("no job for assessment {id}")))?;
    let status = state
        .queue
        .cancel(job.id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("job {}", job.id)))?;
    Ok(Json(CancelResponse { job_id: job.id, status }))
}

/// Recent assessments of one tenant.
pub async fn list_for_tenant(
    State(state): State<ApiState>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<Vec<maes_common::Assessment>>> {
    state
        .store
        .tenants
        .get(tenant_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("tenant {tenant_id}")))?;
    let assessments = state.store.assessments.list_for_tenant(tenant_id, 50).await?;
    Ok(Json(assessments))
}

/// Live queue counters.
pub async fn queue_stats(State(state): State<ApiState>) -> ApiResult<Json<JobCounts>> {
    Ok(Json(state.queue.stats().await?))
}
