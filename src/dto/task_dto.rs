use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProcessResumeRequest {
    pub candidate_id: Uuid,
    #[validate(url(message = "Invalid resume url"))]
    pub resume_url: Option<String>,
    #[validate(length(max = 200000))]
    pub resume_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ComputeMatchRequest {
    pub candidate_id: Uuid,
    pub job_id: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActiveTasksQuery {
    pub limit: Option<i64>,
}
