use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::candidate::Candidate;
use crate::utils::validation::{validate_not_blank, validate_phone, validate_skills};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IntakeCandidate {
    #[validate(
        length(min = 1, max = 200, message = "Candidate name cannot be empty"),
        custom(function = "validate_not_blank")
    )]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
    #[validate(url(message = "Invalid resume url"))]
    pub resume_url: Option<String>,
    #[validate(length(max = 200000))]
    pub resume_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateResume {
    #[validate(url(message = "Invalid resume url"))]
    pub resume_url: Option<String>,
    #[validate(length(max = 200000))]
    pub resume_text: Option<String>,
}

/// Candidate plus the background parse task, when the resume is fetched asynchronously.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateResponse {
    #[serde(flatten)]
    pub candidate: Candidate,
    pub parse_task_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IntakeJob {
    #[validate(
        length(min = 1, max = 200, message = "Job title cannot be empty"),
        custom(function = "validate_not_blank")
    )]
    pub title: String,
    #[validate(length(min = 1, max = 20000))]
    pub description: String,
    #[serde(default)]
    #[validate(custom(function = "validate_skills"))]
    pub must_have: Vec<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_skills"))]
    pub nice_to_have: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateJob {
    #[validate(
        length(min = 1, max = 200),
        custom(function = "validate_not_blank")
    )]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 20000))]
    pub description: Option<String>,
    #[validate(custom(function = "validate_skills"))]
    pub must_have: Option<Vec<String>>,
    #[validate(custom(function = "validate_skills"))]
    pub nice_to_have: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    pub fn bounds(&self) -> (i64, i64) {
        (
            self.limit.unwrap_or(50).clamp(1, 200),
            self.offset.unwrap_or(0).max(0),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MatchRequest {
    pub candidate_id: Uuid,
    pub job_id: Uuid,
}
