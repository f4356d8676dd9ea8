use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
};
use uuid::Uuid;
use validator::Validate;

use crate::{dto::intake_dto::MatchRequest, error::Result, AppState};

/// Synchronous match: the scorer runs inside the request.
#[axum::debug_handler]
pub async fn match_pair(
    State(state): State<AppState>,
    Json(payload): Json<MatchRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let application = state
        .matching
        .match_application(payload.candidate_id, payload.job_id)
        .await?;
    Ok(Json(application))
}

#[axum::debug_handler]
pub async fn get_application(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let application = state.matching.get_application(id).await?;
    Ok(Json(application))
}
