use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::intake_dto::{IntakeCandidate, IntakeJob, ListQuery, UpdateJob, UpdateResume},
    error::Result,
    AppState,
};

#[axum::debug_handler]
pub async fn create_candidate(
    State(state): State<AppState>,
    Json(payload): Json<IntakeCandidate>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let created = state.registry.create_candidate(payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[axum::debug_handler]
pub async fn get_candidate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let candidate = state.registry.get_candidate(id).await?;
    Ok(Json(candidate))
}

#[axum::debug_handler]
pub async fn list_candidates(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let (limit, offset) = query.bounds();
    let candidates = state.registry.list_candidates(limit, offset).await?;
    Ok(Json(candidates))
}

#[axum::debug_handler]
pub async fn update_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateResume>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let updated = state.registry.update_resume(id, payload).await?;
    let status = if updated.parse_task_id.is_some() {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(updated)))
}

#[axum::debug_handler]
pub async fn create_job(
    State(state): State<AppState>,
    Json(payload): Json<IntakeJob>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let job = state.registry.create_job(payload).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

#[axum::debug_handler]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let job = state.registry.get_job(id).await?;
    Ok(Json(job))
}

#[axum::debug_handler]
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let (limit, offset) = query.bounds();
    let jobs = state.registry.list_jobs(limit, offset).await?;
    Ok(Json(jobs))
}

#[axum::debug_handler]
pub async fn update_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateJob>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let job = state.registry.update_job(id, payload).await?;
    Ok(Json(job))
}
