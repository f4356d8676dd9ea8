use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use uuid::Uuid;
use validator::Validate;

use crate::{dto::score_dto::ScorePayload, error::Result, AppState};

/// 201 on the first write, 200 with the stored score on every repeat.
#[axum::debug_handler]
pub async fn finalize(
    State(state): State<AppState>,
    Path(interview_id): Path<Uuid>,
    Json(payload): Json<ScorePayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let finalized = state.lifecycle.finalize(interview_id, payload).await?;
    let status = if finalized.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(finalized.score)))
}

#[axum::debug_handler]
pub async fn get_score(
    State(state): State<AppState>,
    Path(interview_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let score = state.lifecycle.get_score(interview_id).await?;
    Ok(Json(score))
}
