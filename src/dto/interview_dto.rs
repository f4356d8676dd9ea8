use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::application::ApplicationStatus;
use crate::services::credential_service::SessionCredentials;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InviteRequest {
    pub application_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteResponse {
    pub application_id: Uuid,
    pub link_id: Uuid,
    pub invite_url: String,
    pub expires_at: DateTime<Utc>,
    pub email_task_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConfirmRequest {
    #[validate(length(min = 1, message = "Token cannot be empty"))]
    pub token: String,
    pub slot_start: DateTime<Utc>,
    pub slot_end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmResponse {
    pub interview_id: Uuid,
    pub application_id: Uuid,
    pub status: ApplicationStatus,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub message: String,
    pub email_task_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResponse {
    pub interview_id: Uuid,
    pub credentials: SessionCredentials,
    pub reissued: bool,
    pub window_closes_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CompleteRequest {
    #[validate(url)]
    pub audio_url: Option<String>,
    #[validate(url)]
    pub transcript_url: Option<String>,
}
