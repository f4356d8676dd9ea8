use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::database::Store;
use crate::error::{Error, Result};
use crate::models::application::{Application, ApplicationStatus, FitLabel, MatchRecord};
use crate::models::candidate::Candidate;
use crate::models::job::Job;
use crate::utils::time::Clock;

#[derive(Debug, Clone, Serialize)]
pub struct CandidateProfile {
    pub candidate_id: Uuid,
    pub name: String,
    pub skills: Vec<String>,
    pub resume_text: String,
}

impl From<&Candidate> for CandidateProfile {
    fn from(candidate: &Candidate) -> Self {
        Self {
            candidate_id: candidate.id,
            name: candidate.name.clone(),
            skills: candidate.resume.skills.clone(),
            resume_text: candidate.resume.text.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobProfile {
    pub job_id: Uuid,
    pub title: String,
    pub description: String,
    pub must_have: Vec<String>,
    pub nice_to_have: Vec<String>,
}

impl From<&Job> for JobProfile {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            title: job.title.clone(),
            description: job.description.clone(),
            must_have: job.must_have.clone(),
            nice_to_have: job.nice_to_have.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
    pub score: f64,
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// Opaque fit scorer for a candidate/job pair. Scores are in `[0, 1]`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, candidate: &CandidateProfile, job: &JobProfile) -> Result<MatchScore>;
}

/// Deterministic skill-overlap scorer, used when no AI key is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordScorer;

impl KeywordScorer {
    pub fn compute(candidate: &CandidateProfile, job: &JobProfile) -> MatchScore {
        let skills: BTreeSet<String> = candidate
            .skills
            .iter()
            .map(|s| s.trim().to_lowercase())
            .collect();
        let (matched, missing): (Vec<&String>, Vec<&String>) = job
            .must_have
            .iter()
            .partition(|s| skills.contains(&s.trim().to_lowercase()));

        let raw = 0.5 + 0.1 * matched.len() as f64 - 0.05 * missing.len() as f64;
        let score = raw.clamp(0.0, 1.0);

        let join = |items: &[&String]| {
            items
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let reasons = vec![
            if matched.is_empty() {
                "No overlaps".to_string()
            } else {
                format!("Matched skills: {}", join(&matched))
            },
            if missing.is_empty() {
                "All must-haves present".to_string()
            } else {
                format!("Missing must-haves: {}", join(&missing))
            },
        ];
        MatchScore { score, reasons }
    }
}

#[async_trait]
impl Scorer for KeywordScorer {
    async fn score(&self, candidate: &CandidateProfile, job: &JobProfile) -> Result<MatchScore> {
        Ok(Self::compute(candidate, job))
    }
}

#[derive(Clone)]
pub struct MatchService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    scorer: Arc<dyn Scorer>,
    threshold: f64,
    timeout: Duration,
}

impl MatchService {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        scorer: Arc<dyn Scorer>,
        threshold: f64,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            scorer,
            threshold,
            timeout,
        }
    }

    pub async fn get_application(&self, id: Uuid) -> Result<Application> {
        self.store
            .get_application(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("application {} not found", id)))
    }

    /// Scores the pair exactly once and persists the outcome.
    ///
    /// A scorer failure still leaves a `pending` application behind, then surfaces as
    /// `UpstreamUnavailable` so the caller can retry.
    pub async fn match_application(&self, candidate_id: Uuid, job_id: Uuid) -> Result<Application> {
        let candidate = self
            .store
            .get_candidate(candidate_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("candidate {} not found", candidate_id)))?;
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("job {} not found", job_id)))?;

        if let Some(existing) = self.store.find_application(candidate_id, job_id).await? {
            if !existing.status.is_match_phase() {
                return Err(Error::InvalidState(format!(
                    "application is already {}",
                    existing.status
                )));
            }
        }

        let candidate_profile = CandidateProfile::from(&candidate);
        let job_profile = JobProfile::from(&job);
        let outcome = match tokio::time::timeout(
            self.timeout,
            self.scorer.score(&candidate_profile, &job_profile),
        )
        .await
        {
            Ok(Ok(scored)) if scored.score.is_finite() => Ok(scored),
            Ok(Ok(scored)) => Err(format!("scorer returned a non-finite score: {}", scored.score)),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err(format!("scorer timed out after {:?}", self.timeout)),
        };

        let now = self.clock.now();
        match outcome {
            Ok(scored) => {
                let score = scored.score.clamp(0.0, 1.0);
                let status = if score >= self.threshold {
                    ApplicationStatus::Matched
                } else {
                    ApplicationStatus::Rejected
                };
                let record = MatchRecord {
                    candidate_id,
                    job_id,
                    score: Some(score),
                    fit: Some(FitLabel::from_score(score, self.threshold)),
                    reasons: scored.reasons,
                    status,
                };
                let app = self.store.upsert_match(record, now).await?.ok_or_else(|| {
                    Error::InvalidState("application moved past matching".to_string())
                })?;
                tracing::info!(
                    application_id = %app.id,
                    score,
                    status = %app.status,
                    "application matched"
                );
                Ok(app)
            }
            Err(reason) => {
                tracing::warn!(%candidate_id, %job_id, error = %reason, "scorer unavailable");
                let record = MatchRecord {
                    candidate_id,
                    job_id,
                    score: None,
                    fit: None,
                    reasons: Vec::new(),
                    status: ApplicationStatus::Pending,
                };
                self.store.upsert_match(record, now).await?;
                Err(Error::UpstreamUnavailable(reason))
            }
        }
    }
}
