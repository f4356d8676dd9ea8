use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{Enqueued, FinalizeRecord, Store};
use crate::error::{Error, Result};
use crate::models::admin::Admin;
use crate::models::application::{Application, ApplicationStatus, FitLabel, MatchRecord};
use crate::models::availability::AvailabilityReply;
use crate::models::candidate::{Candidate, ParsedResume};
use crate::models::dashboard::DashboardCounts;
use crate::models::email_log::EmailLog;
use crate::models::interview::{Interview, InterviewArtifacts, InterviewStatus};
use crate::models::interview_link::{InterviewLink, LinkStatus};
use crate::models::job::Job;
use crate::models::score::Score;
use crate::models::task::{NewTask, TaskCount, TaskRecord, TaskStatus};

#[derive(Default)]
struct State {
    admins: HashMap<Uuid, Admin>,
    candidates: HashMap<Uuid, Candidate>,
    jobs: HashMap<Uuid, Job>,
    applications: HashMap<Uuid, Application>,
    links: HashMap<Uuid, InterviewLink>,
    interviews: HashMap<Uuid, Interview>,
    scores: HashMap<Uuid, Score>,
    emails: Vec<EmailLog>,
    replies: Vec<AvailabilityReply>,
    tasks: Vec<TaskRecord>,
}

impl State {
    fn move_application(
        &mut self,
        id: Uuid,
        from: &[ApplicationStatus],
        to: ApplicationStatus,
        at: DateTime<Utc>,
    ) -> bool {
        match self.applications.get_mut(&id) {
            Some(app) if from.contains(&app.status) => {
                app.status = to;
                app.version += 1;
                app.updated_at = at;
                true
            }
            _ => false,
        }
    }

    fn push_task(&mut self, task: NewTask, at: DateTime<Utc>) -> Enqueued {
        let mut replaced = None;
        if let Some(key) = task.dedup_key.as_deref() {
            for existing in self.tasks.iter_mut() {
                if existing.status == TaskStatus::Pending
                    && existing.dedup_key.as_deref() == Some(key)
                {
                    existing.status = TaskStatus::Cancelled;
                    existing.finished_at = Some(at);
                    existing.last_error = Some("superseded by a newer task".to_string());
                    replaced = Some(existing.id);
                }
            }
        }
        let record = TaskRecord::from_new(task, at);
        self.tasks.push(record.clone());
        Enqueued {
            task: record,
            replaced,
        }
    }

    fn task_mut(&mut self, id: Uuid) -> Result<&mut TaskRecord> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::NotFound(format!("task {} not found", id)))
    }
}

/// Process-local store used by tests and `STORE=memory` runs.
///
/// One mutex guards all tables, so every trait method is a single atomic unit.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("memory store lock poisoned".to_string()))
    }

    /// All tasks in insertion order.
    pub fn tasks(&self) -> Result<Vec<TaskRecord>> {
        Ok(self.state()?.tasks.clone())
    }
}

fn page<T: Clone>(mut rows: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    let offset = offset.max(0) as usize;
    let limit = limit.max(0) as usize;
    if offset >= rows.len() {
        return Vec::new();
    }
    rows.drain(..offset);
    rows.truncate(limit);
    rows
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        self.state().map(|_| ())
    }

    async fn insert_admin(&self, admin: Admin) -> Result<Admin> {
        let mut state = self.state()?;
        if state
            .admins
            .values()
            .any(|a| a.email.eq_ignore_ascii_case(&admin.email))
        {
            return Err(Error::InvalidState(format!(
                "admin {} already exists",
                admin.email
            )));
        }
        state.admins.insert(admin.id, admin.clone());
        Ok(admin)
    }

    async fn get_admin(&self, id: Uuid) -> Result<Option<Admin>> {
        Ok(self.state()?.admins.get(&id).cloned())
    }

    async fn find_admin_by_email(&self, email: &str) -> Result<Option<Admin>> {
        let state = self.state()?;
        Ok(state
            .admins
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn record_admin_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state()?;
        if let Some(admin) = state.admins.get_mut(&id) {
            admin.last_login_at = Some(at);
        }
        Ok(())
    }

    async fn insert_candidate(&self, candidate: Candidate) -> Result<Candidate> {
        let mut state = self.state()?;
        state.candidates.insert(candidate.id, candidate.clone());
        Ok(candidate)
    }

    async fn get_candidate(&self, id: Uuid) -> Result<Option<Candidate>> {
        Ok(self.state()?.candidates.get(&id).cloned())
    }

    async fn update_candidate_resume(
        &self,
        id: Uuid,
        resume_url: Option<String>,
        resume: ParsedResume,
        at: DateTime<Utc>,
    ) -> Result<Option<Candidate>> {
        let mut state = self.state()?;
        Ok(state.candidates.get_mut(&id).map(|candidate| {
            if resume_url.is_some() {
                candidate.resume_url = resume_url;
            }
            candidate.resume = Json(resume);
            candidate.updated_at = at;
            candidate.clone()
        }))
    }

    async fn list_candidates(&self, limit: i64, offset: i64) -> Result<Vec<Candidate>> {
        let state = self.state()?;
        let mut rows: Vec<Candidate> = state.candidates.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(page(rows, limit, offset))
    }

    async fn insert_job(&self, job: Job) -> Result<Job> {
        let mut state = self.state()?;
        state.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.state()?.jobs.get(&id).cloned())
    }

    async fn update_job(&self, job: Job) -> Result<Option<Job>> {
        let mut state = self.state()?;
        Ok(state.jobs.get_mut(&job.id).map(|existing| {
            *existing = job;
            existing.clone()
        }))
    }

    async fn list_jobs(&self, limit: i64, offset: i64) -> Result<Vec<Job>> {
        let state = self.state()?;
        let mut rows: Vec<Job> = state.jobs.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(page(rows, limit, offset))
    }

    async fn get_application(&self, id: Uuid) -> Result<Option<Application>> {
        Ok(self.state()?.applications.get(&id).cloned())
    }

    async fn list_applications(&self, limit: i64, offset: i64) -> Result<Vec<Application>> {
        let state = self.state()?;
        let mut rows: Vec<Application> = state.applications.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(page(rows, limit, offset))
    }

    async fn find_application(
        &self,
        candidate_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<Application>> {
        let state = self.state()?;
        Ok(state
            .applications
            .values()
            .find(|a| a.candidate_id == candidate_id && a.job_id == job_id)
            .cloned())
    }

    async fn upsert_match(
        &self,
        record: MatchRecord,
        at: DateTime<Utc>,
    ) -> Result<Option<Application>> {
        let mut state = self.state()?;
        let existing = state
            .applications
            .values_mut()
            .find(|a| a.candidate_id == record.candidate_id && a.job_id == record.job_id);
        match existing {
            Some(app) if app.status.is_match_phase() => {
                app.score = record.score;
                app.fit = record.fit;
                app.reasons = record.reasons;
                app.status = record.status;
                app.version += 1;
                app.updated_at = at;
                Ok(Some(app.clone()))
            }
            Some(_) => Ok(None),
            None => {
                let app = Application::from_match(&record, at);
                state.applications.insert(app.id, app.clone());
                Ok(Some(app))
            }
        }
    }

    async fn open_invitation(
        &self,
        application_id: Uuid,
        from: &[ApplicationStatus],
        link: InterviewLink,
        email: NewTask,
        at: DateTime<Utc>,
    ) -> Result<Option<(InterviewLink, TaskRecord)>> {
        let mut state = self.state()?;
        if !state.move_application(application_id, from, ApplicationStatus::Invited, at) {
            return Ok(None);
        }
        for existing in state.links.values_mut() {
            if existing.application_id == application_id && existing.status == LinkStatus::Issued
            {
                existing.status = LinkStatus::Expired;
            }
        }
        state.links.insert(link.id, link.clone());
        let enqueued = state.push_task(email, at);
        Ok(Some((link, enqueued.task)))
    }

    async fn get_link(&self, id: Uuid) -> Result<Option<InterviewLink>> {
        Ok(self.state()?.links.get(&id).cloned())
    }

    async fn get_link_by_token(&self, token: &str) -> Result<Option<InterviewLink>> {
        let state = self.state()?;
        Ok(state.links.values().find(|l| l.token == token).cloned())
    }

    async fn latest_link(&self, application_id: Uuid) -> Result<Option<InterviewLink>> {
        let state = self.state()?;
        Ok(state
            .links
            .values()
            .filter(|l| l.application_id == application_id)
            .max_by_key(|l| l.created_at)
            .cloned())
    }

    async fn expire_link(&self, link_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state()?;
        let application_id = match state.links.get_mut(&link_id) {
            Some(link) if link.status == LinkStatus::Issued => {
                link.status = LinkStatus::Expired;
                link.application_id
            }
            _ => return Ok(false),
        };
        state.move_application(
            application_id,
            &[ApplicationStatus::Invited],
            ApplicationStatus::Expired,
            at,
        );
        Ok(true)
    }

    async fn confirm_link(
        &self,
        link_id: Uuid,
        interview: Interview,
        email: NewTask,
        at: DateTime<Utc>,
    ) -> Result<Option<(Interview, TaskRecord)>> {
        let mut state = self.state()?;
        let application_id = match state.links.get(&link_id) {
            Some(link) if link.status == LinkStatus::Issued && link.expires_at > at => {
                link.application_id
            }
            _ => return Ok(None),
        };
        let (from, to) = InterviewStatus::Scheduled.application_transition();
        if !state.move_application(application_id, from, to, at) {
            return Ok(None);
        }
        if let Some(link) = state.links.get_mut(&link_id) {
            link.status = LinkStatus::Confirmed;
            link.confirmed_at = Some(at);
        }
        state.interviews.insert(interview.id, interview.clone());
        let enqueued = state.push_task(email, at);
        Ok(Some((interview, enqueued.task)))
    }

    async fn consume_link(
        &self,
        link_id: Uuid,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Interview>> {
        let mut state = self.state()?;
        match state.links.get(&link_id) {
            Some(link) if link.status == LinkStatus::Confirmed => {}
            _ => return Ok(None),
        }
        let interview_id = match state
            .interviews
            .values()
            .find(|i| i.link_id == link_id && i.status == InterviewStatus::Scheduled)
        {
            Some(interview) => interview.id,
            None => return Ok(None),
        };
        let application_id = state.interviews[&interview_id].application_id;
        let (from, to) = InterviewStatus::InProgress.application_transition();
        if !state.move_application(application_id, from, to, at) {
            return Ok(None);
        }
        if let Some(link) = state.links.get_mut(&link_id) {
            link.status = LinkStatus::Consumed;
            link.consumed_at = Some(at);
        }
        let interview = state
            .interviews
            .get_mut(&interview_id)
            .ok_or_else(|| Error::Internal("interview vanished during join".to_string()))?;
        interview.status = InterviewStatus::InProgress;
        interview.session_id = Some(session_id.to_string());
        interview.session_started_at = Some(at);
        interview.updated_at = at;
        Ok(Some(interview.clone()))
    }

    async fn list_expired_links(
        &self,
        at: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<InterviewLink>> {
        let state = self.state()?;
        let mut rows: Vec<InterviewLink> = state
            .links
            .values()
            .filter(|l| l.status == LinkStatus::Issued && l.is_expired_at(at))
            .cloned()
            .collect();
        rows.sort_by_key(|l| l.expires_at);
        Ok(page(rows, limit, 0))
    }

    async fn get_interview(&self, id: Uuid) -> Result<Option<Interview>> {
        Ok(self.state()?.interviews.get(&id).cloned())
    }

    async fn get_interview_by_link(&self, link_id: Uuid) -> Result<Option<Interview>> {
        let state = self.state()?;
        Ok(state
            .interviews
            .values()
            .find(|i| i.link_id == link_id)
            .cloned())
    }

    async fn list_interviews(&self, limit: i64, offset: i64) -> Result<Vec<Interview>> {
        let state = self.state()?;
        let mut rows: Vec<Interview> = state.interviews.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(page(rows, limit, offset))
    }

    async fn transition_interview(
        &self,
        id: Uuid,
        from: &[InterviewStatus],
        to: InterviewStatus,
        artifacts: Option<InterviewArtifacts>,
        at: DateTime<Utc>,
    ) -> Result<Option<Interview>> {
        let mut state = self.state()?;
        let application_id = match state.interviews.get(&id) {
            Some(interview) if from.contains(&interview.status) => interview.application_id,
            _ => return Ok(None),
        };
        let (app_from, app_to) = to.application_transition();
        state.move_application(application_id, app_from, app_to, at);
        let interview = state
            .interviews
            .get_mut(&id)
            .ok_or_else(|| Error::Internal("interview vanished during transition".to_string()))?;
        interview.status = to;
        interview.updated_at = at;
        if let Some(artifacts) = artifacts {
            interview.audio_url = artifacts.audio_url.or(interview.audio_url.take());
            interview.transcript_url = artifacts
                .transcript_url
                .or(interview.transcript_url.take());
        }
        Ok(Some(interview.clone()))
    }

    async fn list_stale_interviews(
        &self,
        ended_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Interview>> {
        let state = self.state()?;
        let mut rows: Vec<Interview> = state
            .interviews
            .values()
            .filter(|i| {
                matches!(
                    i.status,
                    InterviewStatus::Scheduled | InterviewStatus::InProgress
                ) && i.end_at < ended_before
            })
            .cloned()
            .collect();
        rows.sort_by_key(|i| i.end_at);
        Ok(page(rows, limit, 0))
    }

    async fn finalize_score(
        &self,
        score: Score,
        notification: NewTask,
        at: DateTime<Utc>,
    ) -> Result<FinalizeRecord> {
        let mut state = self.state()?;
        if let Some(existing) = state.scores.get(&score.interview_id) {
            return Ok(FinalizeRecord {
                score: existing.clone(),
                created: false,
                notification: None,
            });
        }
        let application_id = match state.interviews.get(&score.interview_id) {
            Some(interview) if interview.status == InterviewStatus::Completed => {
                interview.application_id
            }
            _ => {
                return Err(Error::InvalidState(
                    "interview is not completed".to_string(),
                ))
            }
        };
        state.move_application(
            application_id,
            &[ApplicationStatus::Completed],
            ApplicationStatus::Scored,
            at,
        );
        state.scores.insert(score.interview_id, score.clone());
        let enqueued = state.push_task(notification, at);
        Ok(FinalizeRecord {
            score,
            created: true,
            notification: Some(enqueued.task),
        })
    }

    async fn get_score(&self, interview_id: Uuid) -> Result<Option<Score>> {
        Ok(self.state()?.scores.get(&interview_id).cloned())
    }

    async fn record_email(&self, log: EmailLog) -> Result<EmailLog> {
        let mut state = self.state()?;
        state.emails.push(log.clone());
        Ok(log)
    }

    async fn list_emails(&self, application_id: Uuid) -> Result<Vec<EmailLog>> {
        let state = self.state()?;
        Ok(state
            .emails
            .iter()
            .filter(|e| e.application_id == Some(application_id))
            .cloned()
            .collect())
    }

    async fn record_availability(&self, reply: AvailabilityReply) -> Result<AvailabilityReply> {
        let mut state = self.state()?;
        state.replies.push(reply.clone());
        Ok(reply)
    }

    async fn list_availability(&self, application_id: Uuid) -> Result<Vec<AvailabilityReply>> {
        let state = self.state()?;
        Ok(state
            .replies
            .iter()
            .filter(|r| r.application_id == application_id)
            .cloned()
            .collect())
    }

    async fn dashboard_counts(&self) -> Result<DashboardCounts> {
        let state = self.state()?;
        let fit = |label: FitLabel| {
            state
                .applications
                .values()
                .filter(|a| a.fit == Some(label))
                .count() as i64
        };
        let interviews = |status: InterviewStatus| {
            state
                .interviews
                .values()
                .filter(|i| i.status == status)
                .count() as i64
        };
        Ok(DashboardCounts {
            total_jobs: state.jobs.len() as i64,
            total_candidates: state.candidates.len() as i64,
            total_applications: state.applications.len() as i64,
            fit_applications: fit(FitLabel::Fit),
            borderline_applications: fit(FitLabel::Borderline),
            not_fit_applications: fit(FitLabel::NotFit),
            scheduled_interviews: interviews(InterviewStatus::Scheduled),
            in_progress_interviews: interviews(InterviewStatus::InProgress),
            completed_interviews: interviews(InterviewStatus::Completed),
            scored_interviews: state.scores.len() as i64,
        })
    }

    async fn enqueue_task(&self, task: NewTask, at: DateTime<Utc>) -> Result<Enqueued> {
        let mut state = self.state()?;
        Ok(state.push_task(task, at))
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<TaskRecord>> {
        let state = self.state()?;
        Ok(state.tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn cancel_task(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<TaskRecord>> {
        let mut state = self.state()?;
        match state.tasks.iter_mut().find(|t| t.id == id) {
            Some(task) if task.status == TaskStatus::Pending => {
                task.status = TaskStatus::Cancelled;
                task.finished_at = Some(at);
                Ok(Some(task.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_tasks(&self, status: Option<TaskStatus>, limit: i64) -> Result<Vec<TaskRecord>> {
        let state = self.state()?;
        let mut rows: Vec<TaskRecord> = state
            .tasks
            .iter()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        rows.sort_by_key(|t| t.created_at);
        Ok(page(rows, limit, 0))
    }

    async fn count_tasks(&self) -> Result<Vec<TaskCount>> {
        let state = self.state()?;
        let mut counts: BTreeMap<(String, TaskStatus), i64> = BTreeMap::new();
        for task in &state.tasks {
            *counts
                .entry((task.kind.name().to_string(), task.status))
                .or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|((task_type, status), count)| TaskCount {
                task_type,
                status,
                count,
            })
            .collect())
    }

    async fn release_expired_leases(&self, at: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state()?;
        let mut released = 0;
        for task in state
            .tasks
            .iter_mut()
            .filter(|t| t.status == TaskStatus::Running && t.lease_expired_at(at))
        {
            task.lease_until = None;
            task.last_error = Some("lease expired while running".to_string());
            if task.attempts >= task.max_attempts {
                task.status = TaskStatus::Failed;
                task.finished_at = Some(at);
            } else {
                task.status = TaskStatus::Pending;
            }
            released += 1;
        }
        Ok(released)
    }

    async fn claim_task(
        &self,
        at: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<TaskRecord>> {
        let mut state = self.state()?;
        let busy: Vec<String> = state
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Running && !t.lease_expired_at(at))
            .filter_map(|t| t.serial_key.clone())
            .collect();
        let next = state
            .tasks
            .iter_mut()
            .filter(|t| {
                t.status == TaskStatus::Pending
                    && t.run_at <= at
                    && t.serial_key.as_ref().map_or(true, |k| !busy.contains(k))
            })
            .min_by_key(|t| (t.run_at, t.created_at));
        Ok(next.map(|task| {
            task.status = TaskStatus::Running;
            task.attempts += 1;
            task.started_at = Some(at);
            task.lease_until = Some(lease_until);
            task.clone()
        }))
    }

    async fn complete_task(
        &self,
        id: Uuid,
        attempt: i32,
        result: JsonValue,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state()?;
        let task = state.task_mut(id)?;
        if task.status != TaskStatus::Running || task.attempts != attempt {
            return Ok(false);
        }
        task.status = TaskStatus::Succeeded;
        task.result = Some(result);
        task.last_error = None;
        task.lease_until = None;
        task.finished_at = Some(at);
        Ok(true)
    }

    async fn fail_task(
        &self,
        id: Uuid,
        attempt: i32,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state()?;
        let task = state.task_mut(id)?;
        if task.status != TaskStatus::Running || task.attempts != attempt {
            return Ok(false);
        }
        task.last_error = Some(error.to_string());
        task.lease_until = None;
        match retry_at {
            Some(retry_at) => {
                task.status = TaskStatus::Pending;
                task.run_at = retry_at;
            }
            None => {
                task.status = TaskStatus::Failed;
                task.finished_at = Some(at);
            }
        }
        Ok(true)
    }
}
