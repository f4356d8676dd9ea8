use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Interview token has expired")]
    TokenExpired,

    #[error("Interview token has already been used")]
    TokenConsumed,

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Machine-readable code carried in error bodies and task records.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::BadRequest(_) => "bad_request",
            Error::Unauthorized(_) => "unauthorized",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::InvalidState(_) => "invalid_state",
            Error::TokenExpired => "token_expired",
            Error::TokenConsumed => "token_consumed",
            Error::UpstreamUnavailable(_) | Error::Reqwest(_) => "upstream_unavailable",
            Error::Validation(_) | Error::InvalidInput(_) | Error::Json(_) => "validation_error",
            Error::Database(_) | Error::Migrate(_) => "database_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Transient failures that the task runner retries with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::UpstreamUnavailable(_) | Error::Reqwest(_))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let code = self.code();
        let (status, error_message) = match self {
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Error::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Error::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Error::InvalidState(msg) => (StatusCode::CONFLICT, msg),
            err @ Error::TokenExpired => (StatusCode::GONE, err.to_string()),
            err @ Error::TokenConsumed => (StatusCode::CONFLICT, err.to_string()),
            Error::UpstreamUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Error::Reqwest(err) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("External service error: {}", err),
            ),
            Error::Validation(err) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
            Error::InvalidInput(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            Error::Json(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Error::Database(err) => {
                tracing::error!(error = %err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred".to_string(),
                )
            }
            other => {
                tracing::error!(error = %other, "unhandled error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": error_message, "code": code }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            other => Error::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_errors_map_to_distinct_statuses() {
        assert_eq!(
            Error::TokenExpired.into_response().status(),
            StatusCode::GONE
        );
        assert_eq!(
            Error::TokenConsumed.into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::UpstreamUnavailable("scorer".into())
                .into_response()
                .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn only_upstream_failures_are_transient() {
        assert!(Error::UpstreamUnavailable("x".into()).is_transient());
        assert!(!Error::InvalidState("x".into()).is_transient());
        assert!(!Error::TokenExpired.is_transient());
    }
}
