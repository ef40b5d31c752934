//! Schedule endpoints

use axum::extract::{Path, Query, State};
use axum::Json;
use maes_common::{CoreError, Schedule};
use maes_scheduler::{CreateSchedule, SchedulerStats, UpdateSchedule};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiResult, ApiState};

pub async fn create(
    State(state): State<ApiState>,
    Json(request): Json<CreateSchedule>,
) -> ApiResult<Json<Schedule>> {
    Ok(Json(state.scheduler.create_schedule(request).await?))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub tenant_id: Uuid,
}

pub async fn list(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Schedule>>> {
    Ok(Json(state.scheduler.list_schedules(query.tenant_id).await?))
}

pub async fn get(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Schedule>> {
    let schedule = state
        .scheduler
        .get_schedule(id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("schedule {id}")))?;
    Ok(Json(schedule))
}

pub async fn update(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateSchedule>,
) -> ApiResult<Json<Schedule>> {
    Ok(Json(state.scheduler.update_schedule(id, request).await?))
}

pub async fn delete(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .scheduler
        .get_schedule(id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("schedule {id}")))?;
    state.scheduler.delete_schedule(id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

pub async fn stats(State(state): State<ApiState>) -> ApiResult<Json<SchedulerStats>> {
    Ok(Json(state.scheduler.stats().await?))
}
