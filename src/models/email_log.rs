use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::task::EmailTemplate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmailLog {
    pub id: Uuid,
    pub application_id: Option<Uuid>,
    pub template: EmailTemplate,
    pub to_email: String,
    pub subject: String,
    pub provider_message_id: String,
    pub sent_at: DateTime<Utc>,
}
