use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

use super::application::ApplicationStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum InterviewStatus {
    Scheduled,
    InProgress,
    Completed,
    Abandoned,
}

impl InterviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewStatus::Scheduled => "scheduled",
            InterviewStatus::InProgress => "in_progress",
            InterviewStatus::Completed => "completed",
            InterviewStatus::Abandoned => "abandoned",
        }
    }

    /// Application statuses that follow an interview transition into `self`:
    /// the set the application must currently be in, and the status it moves to.
    pub fn application_transition(&self) -> (&'static [ApplicationStatus], ApplicationStatus) {
        match self {
            InterviewStatus::Scheduled => (&[ApplicationStatus::Invited], ApplicationStatus::Confirmed),
            InterviewStatus::InProgress => {
                (&[ApplicationStatus::Confirmed], ApplicationStatus::InProgress)
            }
            InterviewStatus::Completed => {
                (&[ApplicationStatus::InProgress], ApplicationStatus::Completed)
            }
            InterviewStatus::Abandoned => (
                &[ApplicationStatus::Confirmed, ApplicationStatus::InProgress],
                ApplicationStatus::Abandoned,
            ),
        }
    }
}

impl fmt::Display for InterviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Recording references attached when a session completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterviewArtifacts {
    pub audio_url: Option<String>,
    pub transcript_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Interview {
    pub id: Uuid,
    pub application_id: Uuid,
    pub link_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: InterviewStatus,
    pub session_id: Option<String>,
    pub session_started_at: Option<DateTime<Utc>>,
    pub audio_url: Option<String>,
    pub transcript_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Interview {
    pub fn scheduled(
        application_id: Uuid,
        link_id: Uuid,
        slot: ScheduleSlot,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            application_id,
            link_id,
            start_at: slot.start,
            end_at: slot.end,
            status: InterviewStatus::Scheduled,
            session_id: None,
            session_started_at: None,
            audio_url: None,
            transcript_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn session_id(&self) -> String {
        format!("interview_{}", self.id.simple())
    }

    pub fn window(&self, lead: Duration, grace: Duration) -> SessionWindow {
        SessionWindow {
            opens_at: self.start_at - lead,
            closes_at: self.end_at + grace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
}

impl SessionWindow {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        now >= self.opens_at && now <= self.closes_at
    }

    pub fn has_closed(&self, now: DateTime<Utc>) -> bool {
        now > self.closes_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_includes_lead_and_grace() {
        let start = Utc.with_ymd_and_hms(2026, 10, 20, 10, 0, 0).unwrap();
        let slot = ScheduleSlot {
            start,
            end: start + Duration::hours(1),
        };
        let interview = Interview::scheduled(Uuid::new_v4(), Uuid::new_v4(), slot, start);
        let window = interview.window(Duration::minutes(15), Duration::minutes(30));

        assert!(!window.contains(start - Duration::minutes(16)));
        assert!(window.contains(start - Duration::minutes(15)));
        assert!(window.contains(start + Duration::minutes(90)));
        assert!(window.has_closed(start + Duration::minutes(91)));
    }
}

impl sqlx::postgres::PgHasArrayType for InterviewStatus {
    fn array_type_info() -> sqlx::postgres::PgTypeInfo {
        <&str as sqlx::postgres::PgHasArrayType>::array_type_info()
    }
}
