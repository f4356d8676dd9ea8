use axum::{
    extract::State,
    response::{IntoResponse, Json},
};
use serde_json::json;

use crate::{error::Result, AppState};

#[axum::debug_handler]
pub async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let counts = state.dashboard.stats().await?;
    Ok(Json(counts))
}

#[axum::debug_handler]
pub async fn recent_activity(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let activities = state.dashboard.recent_activity().await?;
    Ok(Json(json!({ "activities": activities })))
}
