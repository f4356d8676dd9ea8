use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Transitions are monotonic: `issued → confirmed → consumed`, or `issued → expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum LinkStatus {
    Issued,
    Confirmed,
    Expired,
    Consumed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InterviewLink {
    pub id: Uuid,
    pub application_id: Uuid,
    #[serde(skip_serializing)]
    pub token: String,
    pub status: LinkStatus,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl InterviewLink {
    pub fn issued(
        application_id: Uuid,
        token: String,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            application_id,
            token,
            status: LinkStatus::Issued,
            expires_at,
            confirmed_at: None,
            consumed_at: None,
            created_at: now,
        }
    }

    /// Expiry is inclusive: a token is dead at exactly `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
