use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde_json::json;
use validator::Validate;

use crate::{dto::auth_dto::LoginRequest, error::Result, middleware::auth::Claims, AppState};

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let session = state.identity.login(&payload.email, &payload.password).await?;
    Ok(Json(session))
}

#[axum::debug_handler]
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let admin = state.identity.current_admin(&claims).await?;
    Ok(Json(admin))
}

#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    state.identity.logout(&claims);
    Ok(Json(json!({"message": "Successfully logged out"})))
}

#[axum::debug_handler]
pub async fn init_admin(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let admin = state.identity.init_admin().await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Default admin created",
            "email": admin.email,
            "note": "Change the default password in production",
        })),
    ))
}
