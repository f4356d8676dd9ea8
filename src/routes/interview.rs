use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::interview_dto::{
        CompleteRequest, ConfirmRequest, ConfirmResponse, InviteRequest, InviteResponse,
        JoinResponse,
    },
    error::Result,
    models::application::ApplicationStatus,
    models::interview::{InterviewArtifacts, ScheduleSlot},
    AppState,
};

#[axum::debug_handler]
pub async fn invite(
    State(state): State<AppState>,
    Json(payload): Json<InviteRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let invitation = state.lifecycle.invite(payload.application_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(InviteResponse {
            application_id: invitation.link.application_id,
            link_id: invitation.link.id,
            invite_url: invitation.invite_url,
            expires_at: invitation.link.expires_at,
            email_task_id: invitation.email_task.id,
        }),
    ))
}

/// Public: authorized by the interview token in the body.
#[axum::debug_handler]
pub async fn confirm(
    State(state): State<AppState>,
    Json(payload): Json<ConfirmRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let slot = ScheduleSlot {
        start: payload.slot_start,
        end: payload.slot_end,
    };
    let confirmation = state.lifecycle.confirm(payload.token.trim(), slot).await?;
    Ok(Json(ConfirmResponse {
        interview_id: confirmation.interview.id,
        application_id: confirmation.interview.application_id,
        status: ApplicationStatus::Confirmed,
        start_at: confirmation.interview.start_at,
        end_at: confirmation.interview.end_at,
        message: confirmation.message,
        email_task_id: confirmation.email_task.id,
    }))
}

/// Public: authorized by the interview token in the path.
#[axum::debug_handler]
pub async fn join(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse> {
    let grant = state.lifecycle.join(token.trim()).await?;
    Ok(Json(JoinResponse {
        interview_id: grant.interview.id,
        credentials: grant.credentials,
        reissued: grant.reissued,
        window_closes_at: grant.window.closes_at,
    }))
}

#[axum::debug_handler]
pub async fn get_interview(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let interview = state.lifecycle.get_interview(id).await?;
    Ok(Json(interview))
}

#[axum::debug_handler]
pub async fn complete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Option<Json<CompleteRequest>>,
) -> Result<impl IntoResponse> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    payload.validate()?;
    let artifacts = InterviewArtifacts {
        audio_url: payload.audio_url,
        transcript_url: payload.transcript_url,
    };
    let interview = state.lifecycle.complete(id, artifacts).await?;
    Ok(Json(interview))
}

#[axum::debug_handler]
pub async fn abandon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let interview = state.lifecycle.abandon(id).await?;
    Ok(Json(interview))
}
