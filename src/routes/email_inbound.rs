use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
    Form,
};
use uuid::Uuid;

use crate::{
    dto::inbound_dto::{InboundEmail, InboundQuery},
    error::Result,
    AppState,
};

/// Provider webhook for candidate replies to the invitation email.
#[axum::debug_handler]
pub async fn inbound(
    State(state): State<AppState>,
    Query(query): Query<InboundQuery>,
    Form(email): Form<InboundEmail>,
) -> Result<impl IntoResponse> {
    state.replies.authorize(query.secret.as_deref())?;
    let outcome = state.replies.handle_inbound(email).await?;
    Ok(Json(outcome))
}

#[axum::debug_handler]
pub async fn list_availability(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.matching.get_application(id).await?;
    let replies = state.replies.list(id).await?;
    Ok(Json(replies))
}
