use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

use crate::models::score::Recommendation;
use crate::utils::validation::validate_rubric;

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ScorePayload {
    #[serde(default)]
    #[validate(custom(function = "validate_rubric"))]
    pub rubric: BTreeMap<String, f64>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub total_score: Option<f64>,
    pub recommendation: Option<Recommendation>,
    #[validate(length(max = 5000))]
    pub summary: Option<String>,
}
