use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Lifecycle of one candidate/job pairing.
///
/// `pending`, `matched` and `rejected` belong to the match phase; the remaining
/// states are driven by the interview lifecycle controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Matched,
    Rejected,
    Invited,
    Confirmed,
    InProgress,
    Completed,
    Scored,
    Expired,
    Abandoned,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Matched => "matched",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Invited => "invited",
            ApplicationStatus::Confirmed => "confirmed",
            ApplicationStatus::InProgress => "in_progress",
            ApplicationStatus::Completed => "completed",
            ApplicationStatus::Scored => "scored",
            ApplicationStatus::Expired => "expired",
            ApplicationStatus::Abandoned => "abandoned",
        }
    }

    pub const MATCH_PHASE: [ApplicationStatus; 3] = [
        ApplicationStatus::Pending,
        ApplicationStatus::Matched,
        ApplicationStatus::Rejected,
    ];

    pub fn is_match_phase(&self) -> bool {
        Self::MATCH_PHASE.contains(self)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum FitLabel {
    Fit,
    Borderline,
    NotFit,
}

impl FitLabel {
    pub fn from_score(score: f64, threshold: f64) -> Self {
        if score >= 0.70_f64.max(threshold) {
            FitLabel::Fit
        } else if score >= threshold {
            FitLabel::Borderline
        } else {
            FitLabel::NotFit
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Application {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub job_id: Uuid,
    pub score: Option<f64>,
    pub fit: Option<FitLabel>,
    pub reasons: Vec<String>,
    pub status: ApplicationStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of one matching call, written through `Store::upsert_match`.
#[derive(Debug, Clone)]
pub struct MatchRecord {
    pub candidate_id: Uuid,
    pub job_id: Uuid,
    pub score: Option<f64>,
    pub fit: Option<FitLabel>,
    pub reasons: Vec<String>,
    pub status: ApplicationStatus,
}

impl Application {
    pub fn from_match(record: &MatchRecord, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            candidate_id: record.candidate_id,
            job_id: record.job_id,
            score: record.score,
            fit: record.fit,
            reasons: record.reasons.clone(),
            status: record.status,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_name() {
        for status in [
            ApplicationStatus::InProgress,
            ApplicationStatus::Scored,
            ApplicationStatus::Abandoned,
        ] {
            assert_eq!(serde_json::to_value(status).unwrap(), status.to_string());
        }
        assert!(serde_json::from_value::<ApplicationStatus>("archived".into()).is_err());
    }

    #[test]
    fn fit_label_bands() {
        assert_eq!(FitLabel::from_score(0.82, 0.55), FitLabel::Fit);
        assert_eq!(FitLabel::from_score(0.60, 0.55), FitLabel::Borderline);
        assert_eq!(FitLabel::from_score(0.40, 0.55), FitLabel::NotFit);
    }
}

impl sqlx::postgres::PgHasArrayType for ApplicationStatus {
    fn array_type_info() -> sqlx::postgres::PgTypeInfo {
        <&str as sqlx::postgres::PgHasArrayType>::array_type_info()
    }
}
