use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use super::interview::ScheduleSlot;

/// A candidate's emailed availability, kept with what was parsed out of it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AvailabilityReply {
    pub id: Uuid,
    pub application_id: Uuid,
    pub raw_text: String,
    pub parsed_slots: Json<Vec<ScheduleSlot>>,
    pub chosen_slot: Option<Json<ScheduleSlot>>,
    pub interview_id: Option<Uuid>,
    /// `scheduled`, `no_slots`, or the error code that blocked scheduling.
    pub outcome: String,
    pub received_at: DateTime<Utc>,
}
