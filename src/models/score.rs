use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum Recommendation {
    Select,
    Maybe,
    Reject,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Select => "select",
            Recommendation::Maybe => "maybe",
            Recommendation::Reject => "reject",
        }
    }

    pub fn from_total(total: f64) -> Self {
        if total >= 80.0 {
            Recommendation::Select
        } else if total >= 60.0 {
            Recommendation::Maybe
        } else {
            Recommendation::Reject
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write-once evaluation of a completed interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Score {
    pub id: Uuid,
    pub interview_id: Uuid,
    pub rubric: Json<BTreeMap<String, f64>>,
    pub total_score: f64,
    pub recommendation: Recommendation,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}
