use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Headline numbers for the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, FromRow)]
pub struct DashboardCounts {
    pub total_jobs: i64,
    pub total_candidates: i64,
    pub total_applications: i64,
    pub fit_applications: i64,
    pub borderline_applications: i64,
    pub not_fit_applications: i64,
    pub scheduled_interviews: i64,
    pub in_progress_interviews: i64,
    pub completed_interviews: i64,
    pub scored_interviews: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Application,
    Interview,
    Candidate,
}

#[derive(Debug, Clone, Serialize)]
pub struct Activity {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub description: String,
    pub status: Option<String>,
    pub timestamp: DateTime<Utc>,
}
