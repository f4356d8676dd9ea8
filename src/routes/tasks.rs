use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::task_dto::{ActiveTasksQuery, ComputeMatchRequest, ProcessResumeRequest},
    error::Result,
    models::task::{TaskKind, TaskRecord},
    AppState,
};

fn accepted(task: TaskRecord) -> impl IntoResponse {
    (
        StatusCode::ACCEPTED,
        Json(json!({"task_id": task.id, "status": task.status})),
    )
}

#[axum::debug_handler]
pub async fn process_resume(
    State(state): State<AppState>,
    Json(payload): Json<ProcessResumeRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let task = state
        .registry
        .enqueue_parse(payload.candidate_id, payload.resume_url, payload.resume_text)
        .await?;
    Ok(accepted(task))
}

#[axum::debug_handler]
pub async fn compute_match(
    State(state): State<AppState>,
    Json(payload): Json<ComputeMatchRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    state.registry.get_candidate(payload.candidate_id).await?;
    state.registry.get_job(payload.job_id).await?;
    let task = state
        .tasks
        .enqueue(TaskKind::ComputeMatch {
            candidate_id: payload.candidate_id,
            job_id: payload.job_id,
        })
        .await?;
    Ok(accepted(task))
}

#[axum::debug_handler]
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let task = state.tasks.status(id).await?;
    Ok(Json(task))
}

#[axum::debug_handler]
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let task = state.tasks.cancel(id).await?;
    Ok(Json(task))
}

#[axum::debug_handler]
pub async fn active_tasks(
    State(state): State<AppState>,
    Query(query): Query<ActiveTasksQuery>,
) -> Result<impl IntoResponse> {
    let tasks = state.tasks.active(query.limit.unwrap_or(50).clamp(1, 200)).await?;
    Ok(Json(json!({ "count": tasks.len(), "tasks": tasks })))
}

#[axum::debug_handler]
pub async fn task_stats(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let buckets = state.tasks.stats().await?;
    Ok(Json(json!({ "stats": buckets })))
}
