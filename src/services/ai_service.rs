use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value as JsonValue;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::services::match_service::{CandidateProfile, JobProfile, MatchScore, Scorer};

const CHAT_MODEL: &str = "gpt-4o-mini";
const RESUME_EXCERPT_CHARS: usize = 2000;

/// OpenAI chat-completions adapter for candidate/job scoring.
#[derive(Clone)]
pub struct AIService {
    client: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl AIService {
    pub fn new(api_key: String, base_url: String, client: Client, timeout: Duration) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    async fn chat_openai(&self, payload: JsonValue) -> Result<JsonValue> {
        let res = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(Error::UpstreamUnavailable(format!(
                "OpenAI API error {}: {}",
                status, text
            )));
        }

        let body: JsonValue = res.json().await?;
        body.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .and_then(|s| serde_json::from_str(s).ok())
            .ok_or_else(|| {
                Error::UpstreamUnavailable("invalid OpenAI response format".to_string())
            })
    }
}

/// Accepts `{score, reasons}` with the score either in `[0, 1]` or on a 0-100 scale.
pub fn parse_match_response(raw: &JsonValue) -> Result<MatchScore> {
    let score = raw
        .get("score")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| Error::UpstreamUnavailable("scorer response has no score".to_string()))?;
    let score = if score > 1.0 { score / 100.0 } else { score };
    let reasons = raw
        .get("reasons")
        .and_then(|v| v.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|e| e.as_str().map(|s| s.trim().to_string()))
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    Ok(MatchScore {
        score: score.clamp(0.0, 1.0),
        reasons,
    })
}

#[async_trait]
impl Scorer for AIService {
    async fn score(&self, candidate: &CandidateProfile, job: &JobProfile) -> Result<MatchScore> {
        let system_prompt = "You are a technical recruiter scoring how well a candidate fits a job. \
            Weigh must-have skills heavily and nice-to-have skills lightly. \
            Return a JSON object {\"score\": number between 0 and 1, \"reasons\": [short strings]}.";

        let excerpt: String = candidate.resume_text.chars().take(RESUME_EXCERPT_CHARS).collect();
        let user_data = serde_json::json!({
            "job": {
                "title": job.title,
                "description": job.description,
                "must_have": job.must_have,
                "nice_to_have": job.nice_to_have,
            },
            "candidate": {
                "skills": candidate.skills,
                "resume_excerpt": excerpt,
            }
        });

        let payload = serde_json::json!({
            "model": CHAT_MODEL,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": serde_json::to_string(&user_data)?}
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0.1
        });

        let response = self.chat_openai(payload).await?;
        parse_match_response(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn percent_scores_are_normalized() {
        let scored = parse_match_response(&json!({"score": 72, "reasons": ["Rust", " "]})).unwrap();
        assert!((scored.score - 0.72).abs() < 1e-9);
        assert_eq!(scored.reasons, vec!["Rust".to_string()]);
    }

    #[test]
    fn missing_score_is_an_upstream_failure() {
        let err = parse_match_response(&json!({"reasons": []})).unwrap_err();
        assert!(err.is_transient());
    }
}
