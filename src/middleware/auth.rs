use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::Error;
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
}

fn unauthorized(code: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": code, "code": "unauthorized"})),
    )
        .into_response()
}

/// Admin-only routes: a valid bearer session with the admin role.
pub async fn require_admin(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(auth_header) = req.headers().get(axum::http::header::AUTHORIZATION) else {
        return unauthorized("missing_authorization");
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return unauthorized("bad_authorization");
    };
    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return unauthorized("unsupported_scheme");
    };

    match state.identity.verify(token.trim()) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(err @ (Error::Unauthorized(_) | Error::Forbidden(_))) => err.into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "admin session check failed");
            unauthorized("invalid_token")
        }
    }
}
