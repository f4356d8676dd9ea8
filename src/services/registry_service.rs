use std::sync::Arc;
use uuid::Uuid;

use crate::database::Store;
use crate::dto::intake_dto::{CandidateResponse, IntakeCandidate, IntakeJob, UpdateJob, UpdateResume};
use crate::error::{Error, Result};
use crate::models::candidate::Candidate;
use crate::models::job::Job;
use crate::models::task::{TaskKind, TaskRecord};
use crate::services::resume_service::ResumeParser;
use crate::services::task_service::TaskService;
use crate::utils::time::Clock;
use crate::utils::validation::clean_skills;

/// Candidate and job records. Inline resume text is parsed on the spot; a resume URL is
/// fetched and parsed by a background task.
#[derive(Clone)]
pub struct RegistryService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    tasks: TaskService,
    resumes: ResumeParser,
}

impl RegistryService {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        tasks: TaskService,
        resumes: ResumeParser,
    ) -> Self {
        Self {
            store,
            clock,
            tasks,
            resumes,
        }
    }

    pub async fn create_candidate(&self, payload: IntakeCandidate) -> Result<CandidateResponse> {
        let resume = payload
            .resume_text
            .as_deref()
            .map(|text| self.resumes.parse_text(text))
            .unwrap_or_default();
        let candidate = Candidate::new(
            payload.name.trim().to_string(),
            payload.email.trim().to_lowercase(),
            payload.phone.map(|p| p.trim().to_string()),
            payload.resume_url.clone(),
            resume,
            self.clock.now(),
        );
        let candidate = self.store.insert_candidate(candidate).await?;
        tracing::info!(candidate_id = %candidate.id, "candidate created");

        let parse_task = match (&payload.resume_text, payload.resume_url) {
            (None, Some(url)) => Some(self.enqueue_parse(candidate.id, Some(url), None).await?),
            _ => None,
        };
        Ok(CandidateResponse {
            candidate,
            parse_task_id: parse_task.map(|t| t.id),
        })
    }

    pub async fn get_candidate(&self, id: Uuid) -> Result<Candidate> {
        self.store
            .get_candidate(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("candidate {} not found", id)))
    }

    pub async fn list_candidates(&self, limit: i64, offset: i64) -> Result<Vec<Candidate>> {
        self.store.list_candidates(limit, offset).await
    }

    /// Replaces the parsed resume. Identity fields never change after intake.
    pub async fn update_resume(&self, id: Uuid, payload: UpdateResume) -> Result<CandidateResponse> {
        let existing = self.get_candidate(id).await?;
        match (payload.resume_text, payload.resume_url) {
            (Some(text), url) => {
                let resume = self.resumes.parse_text(&text);
                let candidate = self
                    .store
                    .update_candidate_resume(existing.id, url, resume, self.clock.now())
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("candidate {} not found", id)))?;
                Ok(CandidateResponse {
                    candidate,
                    parse_task_id: None,
                })
            }
            (None, Some(url)) => {
                let task = self.enqueue_parse(existing.id, Some(url), None).await?;
                Ok(CandidateResponse {
                    candidate: existing,
                    parse_task_id: Some(task.id),
                })
            }
            (None, None) => Err(Error::InvalidInput(
                "resume_url or resume_text is required".to_string(),
            )),
        }
    }

    /// Queues a resume parse for an existing candidate.
    pub async fn enqueue_parse(
        &self,
        candidate_id: Uuid,
        resume_url: Option<String>,
        resume_text: Option<String>,
    ) -> Result<TaskRecord> {
        if resume_url.is_none() && resume_text.is_none() {
            return Err(Error::InvalidInput(
                "resume_url or resume_text is required".to_string(),
            ));
        }
        self.get_candidate(candidate_id).await?;
        self.tasks
            .enqueue(TaskKind::ParseResume {
                candidate_id,
                resume_url,
                resume_text,
            })
            .await
    }

    pub async fn create_job(&self, payload: IntakeJob) -> Result<Job> {
        let job = Job::new(
            payload.title.trim().to_string(),
            payload.description,
            clean_skills(&payload.must_have),
            clean_skills(&payload.nice_to_have),
            self.clock.now(),
        );
        let job = self.store.insert_job(job).await?;
        tracing::info!(job_id = %job.id, "job created");
        Ok(job)
    }

    pub async fn get_job(&self, id: Uuid) -> Result<Job> {
        self.store
            .get_job(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("job {} not found", id)))
    }

    pub async fn list_jobs(&self, limit: i64, offset: i64) -> Result<Vec<Job>> {
        self.store.list_jobs(limit, offset).await
    }

    pub async fn update_job(&self, id: Uuid, payload: UpdateJob) -> Result<Job> {
        let mut job = self.get_job(id).await?;
        if let Some(title) = payload.title {
            job.title = title.trim().to_string();
        }
        if let Some(description) = payload.description {
            job.description = description;
        }
        if let Some(must_have) = payload.must_have {
            job.must_have = clean_skills(&must_have);
        }
        if let Some(nice_to_have) = payload.nice_to_have {
            job.nice_to_have = clean_skills(&nice_to_have);
        }
        job.updated_at = self.clock.now();
        self.store
            .update_job(job)
            .await?
            .ok_or_else(|| Error::NotFound(format!("job {} not found", id)))
    }
}
