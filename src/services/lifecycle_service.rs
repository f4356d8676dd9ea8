use chrono::{Duration, SecondsFormat};
use sqlx::types::Json;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::database::Store;
use crate::dto::score_dto::ScorePayload;
use crate::error::{Error, Result};
use crate::models::application::{Application, ApplicationStatus};
use crate::models::candidate::Candidate;
use crate::models::interview::{
    Interview, InterviewArtifacts, InterviewStatus, ScheduleSlot, SessionWindow,
};
use crate::models::interview_link::{InterviewLink, LinkStatus};
use crate::models::job::Job;
use crate::models::score::{Recommendation, Score};
use crate::models::task::{EmailJob, EmailTemplate, TaskKind, TaskRecord};
use crate::services::credential_service::{CredentialIssuer, SessionCredentials};
use crate::services::identity_service::IdentityService;
use crate::services::task_service::TaskService;
use crate::utils::time::{human_datetime, Clock};

/// Applications in these states can be (re-)invited.
const INVITABLE: [ApplicationStatus; 2] = [ApplicationStatus::Matched, ApplicationStatus::Expired];
const SWEEP_BATCH: i64 = 100;

const RUBRIC_WEIGHTS: [(&str, f64); 4] = [
    ("technical", 0.30),
    ("communication", 0.25),
    ("cultural_fit", 0.25),
    ("problem_solving", 0.20),
];

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub app_base_url: String,
    pub join_lead: Duration,
    pub join_grace: Duration,
    pub upstream_timeout: std::time::Duration,
    pub notify_email: String,
}

impl LifecycleSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            app_base_url: config.app_base_url.trim_end_matches('/').to_string(),
            join_lead: Duration::minutes(config.join_lead_minutes),
            join_grace: Duration::minutes(config.join_grace_minutes),
            upstream_timeout: std::time::Duration::from_secs(config.upstream_timeout_secs),
            notify_email: config.admin_email.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Invitation {
    pub link: InterviewLink,
    pub token: String,
    pub invite_url: String,
    pub email_task: TaskRecord,
}

#[derive(Debug, Clone)]
pub struct Confirmation {
    pub interview: Interview,
    pub message: String,
    pub email_task: TaskRecord,
}

#[derive(Debug, Clone)]
pub struct JoinGrant {
    pub interview: Interview,
    pub credentials: SessionCredentials,
    pub reissued: bool,
    pub window: SessionWindow,
}

#[derive(Debug, Clone)]
pub struct Finalized {
    pub score: Score,
    pub created: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_links: usize,
    pub abandoned_interviews: usize,
}

/// Weighted rubric total on the 0-100 scale.
///
/// Known dimensions carry fixed weights, renormalized over the ones present; a rubric
/// with none of them is averaged evenly.
pub fn weighted_total(rubric: &BTreeMap<String, f64>) -> Option<f64> {
    if rubric.is_empty() {
        return None;
    }
    let (weighted, weight) = RUBRIC_WEIGHTS
        .iter()
        .filter_map(|(dimension, w)| rubric.get(*dimension).map(|v| (v * w, *w)))
        .fold((0.0, 0.0), |(sum, total), (v, w)| (sum + v, total + w));
    let total = if weight > 0.0 {
        weighted / weight
    } else {
        rubric.values().sum::<f64>() / rubric.len() as f64
    };
    Some((total * 100.0).round() / 100.0)
}

/// Drives an application from invitation to a finalized score.
#[derive(Clone)]
pub struct LifecycleService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    identity: IdentityService,
    tasks: TaskService,
    issuer: Arc<dyn CredentialIssuer>,
    settings: LifecycleSettings,
}

impl LifecycleService {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        identity: IdentityService,
        tasks: TaskService,
        issuer: Arc<dyn CredentialIssuer>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            store,
            clock,
            identity,
            tasks,
            issuer,
            settings,
        }
    }

    async fn application(&self, id: Uuid) -> Result<Application> {
        self.store
            .get_application(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("application {} not found", id)))
    }

    async fn parties(&self, app: &Application) -> Result<(Candidate, Job)> {
        let candidate = self
            .store
            .get_candidate(app.candidate_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("candidate {} not found", app.candidate_id)))?;
        let job = self
            .store
            .get_job(app.job_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("job {} not found", app.job_id)))?;
        Ok((candidate, job))
    }

    pub async fn get_interview(&self, id: Uuid) -> Result<Interview> {
        self.store
            .get_interview(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("interview {} not found", id)))
    }

    pub async fn get_score(&self, interview_id: Uuid) -> Result<Score> {
        self.store
            .get_score(interview_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no score for interview {}", interview_id)))
    }

    async fn link_by_token(&self, token: &str) -> Result<InterviewLink> {
        self.store
            .get_link_by_token(token)
            .await?
            .ok_or_else(|| Error::NotFound("interview token not found".to_string()))
    }

    /// `matched` (or `expired`) → `invited`, with a fresh token and the invite email queued.
    pub async fn invite(&self, application_id: Uuid) -> Result<Invitation> {
        let app = self.application(application_id).await?;
        if !INVITABLE.contains(&app.status) {
            return Err(Error::InvalidState(format!(
                "application is {}, expected matched",
                app.status
            )));
        }
        let (candidate, job) = self.parties(&app).await?;

        let now = self.clock.now();
        let issued = self.identity.new_interview_token();
        let invite_url = format!(
            "{}/interview/confirm?token={}",
            self.settings.app_base_url, issued.token
        );
        let link = InterviewLink::issued(app.id, issued.token.clone(), issued.expires_at, now);

        let variables = BTreeMap::from([
            ("candidate_name".to_string(), candidate.name.clone()),
            ("job_title".to_string(), job.title.clone()),
            ("link".to_string(), invite_url.clone()),
            ("expires_at".to_string(), human_datetime(issued.expires_at)),
            ("application_id".to_string(), app.id.to_string()),
        ]);
        let email = self.tasks.prepare(TaskKind::SendEmail(EmailJob {
            application_id: Some(app.id),
            template: EmailTemplate::Invite,
            recipient: candidate.email.clone(),
            variables,
        }));

        let (link, email_task) = self
            .store
            .open_invitation(app.id, &INVITABLE, link, email, now)
            .await?
            .ok_or_else(|| {
                Error::InvalidState("application changed while inviting".to_string())
            })?;
        tracing::info!(
            application_id = %app.id,
            link_id = %link.id,
            expires_at = %link.expires_at,
            "interview invitation issued"
        );
        Ok(Invitation {
            link,
            token: issued.token,
            invite_url,
            email_task,
        })
    }

    /// Books the slot for an invited application. A token is terminal after its first
    /// confirmation or once it expires; expiry wins any race with confirmation.
    pub async fn confirm(&self, token: &str, slot: ScheduleSlot) -> Result<Confirmation> {
        let link = self.link_by_token(token).await?;
        let now = self.clock.now();
        match link.status {
            LinkStatus::Confirmed | LinkStatus::Consumed => return Err(Error::TokenConsumed),
            LinkStatus::Expired => return Err(Error::TokenExpired),
            LinkStatus::Issued => {}
        }
        if link.is_expired_at(now) {
            self.store.expire_link(link.id, now).await?;
            tracing::info!(link_id = %link.id, "interview token expired at confirmation");
            return Err(Error::TokenExpired);
        }
        if slot.end <= slot.start {
            return Err(Error::InvalidInput(
                "slot_end must be after slot_start".to_string(),
            ));
        }

        let app = self.application(link.application_id).await?;
        if app.status != ApplicationStatus::Invited {
            // A concurrent confirm may have won between the link read and this one.
            let conflict = self.confirm_conflict(link.id).await?;
            if matches!(conflict, Error::TokenConsumed | Error::TokenExpired) {
                return Err(conflict);
            }
            return Err(Error::InvalidState(format!(
                "application is {}, expected invited",
                app.status
            )));
        }
        let (candidate, job) = self.parties(&app).await?;

        let interview = Interview::scheduled(app.id, link.id, slot, now);
        let join_url = format!("{}/interview/join/{}", self.settings.app_base_url, token);
        let variables = BTreeMap::from([
            ("candidate_name".to_string(), candidate.name.clone()),
            ("job_title".to_string(), job.title.clone()),
            ("link".to_string(), join_url),
            (
                "start".to_string(),
                slot.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            (
                "end".to_string(),
                slot.end.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            ("interview_id".to_string(), interview.id.to_string()),
        ]);
        let email = self.tasks.prepare(TaskKind::SendEmail(EmailJob {
            application_id: Some(app.id),
            template: EmailTemplate::Confirmation,
            recipient: candidate.email.clone(),
            variables,
        }));

        match self.store.confirm_link(link.id, interview, email, now).await? {
            Some((interview, email_task)) => {
                tracing::info!(
                    application_id = %app.id,
                    interview_id = %interview.id,
                    start_at = %interview.start_at,
                    "interview confirmed"
                );
                let message = format!(
                    "Your interview for {} is confirmed for {} to {}.",
                    job.title,
                    human_datetime(interview.start_at),
                    human_datetime(interview.end_at)
                );
                Ok(Confirmation {
                    interview,
                    message,
                    email_task,
                })
            }
            None => Err(self.confirm_conflict(link.id).await?),
        }
    }

    /// Explains why the confirm compare-and-set did not apply.
    async fn confirm_conflict(&self, link_id: Uuid) -> Result<Error> {
        let now = self.clock.now();
        let current = self.store.get_link(link_id).await?;
        Ok(match current {
            Some(l) if matches!(l.status, LinkStatus::Confirmed | LinkStatus::Consumed) => {
                Error::TokenConsumed
            }
            Some(l) if l.status == LinkStatus::Expired || l.is_expired_at(now) => {
                if l.status == LinkStatus::Issued {
                    self.store.expire_link(l.id, now).await?;
                }
                Error::TokenExpired
            }
            _ => Error::InvalidState("application is no longer awaiting confirmation".to_string()),
        })
    }

    async fn issue_credentials(&self, session_id: &str) -> Result<SessionCredentials> {
        match tokio::time::timeout(self.settings.upstream_timeout, self.issuer.issue(session_id)).await {
            Ok(Ok(credentials)) => Ok(credentials),
            Ok(Err(Error::UpstreamUnavailable(msg))) => Err(Error::UpstreamUnavailable(msg)),
            Ok(Err(other)) => Err(Error::UpstreamUnavailable(format!(
                "credential issuer failed: {}",
                other
            ))),
            Err(_) => Err(Error::UpstreamUnavailable(
                "credential issuer timed out".to_string(),
            )),
        }
    }

    /// Opens the live session. The token is consumed by the first successful join;
    /// later joins within the window get fresh credentials for the running session.
    pub async fn join(&self, token: &str) -> Result<JoinGrant> {
        let link = self.link_by_token(token).await?;
        let now = self.clock.now();
        match link.status {
            LinkStatus::Expired => return Err(Error::TokenExpired),
            LinkStatus::Issued if link.is_expired_at(now) => {
                self.store.expire_link(link.id, now).await?;
                return Err(Error::TokenExpired);
            }
            LinkStatus::Issued => {
                return Err(Error::InvalidState(
                    "interview has not been confirmed yet".to_string(),
                ))
            }
            LinkStatus::Confirmed | LinkStatus::Consumed => {}
        }

        let interview = self
            .store
            .get_interview_by_link(link.id)
            .await?
            .ok_or_else(|| Error::InvalidState("no interview is scheduled".to_string()))?;
        match interview.status {
            InterviewStatus::Abandoned => {
                return Err(Error::InvalidState("interview was abandoned".to_string()))
            }
            InterviewStatus::Completed => return Err(Error::TokenConsumed),
            InterviewStatus::Scheduled | InterviewStatus::InProgress => {}
        }

        let window = interview.window(self.settings.join_lead, self.settings.join_grace);
        if window.has_closed(now) {
            self.store
                .transition_interview(
                    interview.id,
                    &[InterviewStatus::Scheduled, InterviewStatus::InProgress],
                    InterviewStatus::Abandoned,
                    None,
                    now,
                )
                .await?;
            tracing::info!(interview_id = %interview.id, "session window closed, interview abandoned");
            return Err(Error::InvalidState("session window has closed".to_string()));
        }
        if !window.contains(now) {
            return Err(Error::InvalidState(format!(
                "session opens at {}",
                human_datetime(window.opens_at)
            )));
        }

        let session_id = interview.session_id();
        if link.status == LinkStatus::Consumed {
            if interview.status != InterviewStatus::InProgress {
                return Err(Error::TokenConsumed);
            }
            let credentials = self.issue_credentials(&session_id).await?;
            tracing::info!(interview_id = %interview.id, "session credentials reissued");
            return Ok(JoinGrant {
                interview,
                credentials,
                reissued: true,
                window,
            });
        }

        // Credentials first: an issuer failure must leave the token unconsumed.
        let credentials = self.issue_credentials(&session_id).await?;
        match self.store.consume_link(link.id, &session_id, now).await? {
            Some(interview) => {
                tracing::info!(
                    interview_id = %interview.id,
                    application_id = %interview.application_id,
                    %session_id,
                    "interview session started"
                );
                Ok(JoinGrant {
                    interview,
                    credentials,
                    reissued: false,
                    window,
                })
            }
            None => {
                let current = self.get_interview(interview.id).await?;
                if current.status == InterviewStatus::InProgress && window.contains(now) {
                    Ok(JoinGrant {
                        interview: current,
                        credentials,
                        reissued: true,
                        window,
                    })
                } else {
                    Err(Error::TokenConsumed)
                }
            }
        }
    }

    pub async fn complete(
        &self,
        interview_id: Uuid,
        artifacts: InterviewArtifacts,
    ) -> Result<Interview> {
        self.move_interview(
            interview_id,
            &[InterviewStatus::InProgress],
            InterviewStatus::Completed,
            Some(artifacts),
        )
        .await
    }

    pub async fn abandon(&self, interview_id: Uuid) -> Result<Interview> {
        self.move_interview(
            interview_id,
            &[InterviewStatus::Scheduled, InterviewStatus::InProgress],
            InterviewStatus::Abandoned,
            None,
        )
        .await
    }

    async fn move_interview(
        &self,
        interview_id: Uuid,
        from: &[InterviewStatus],
        to: InterviewStatus,
        artifacts: Option<InterviewArtifacts>,
    ) -> Result<Interview> {
        let current = self.get_interview(interview_id).await?;
        if !from.contains(&current.status) {
            return Err(Error::InvalidState(format!(
                "interview is {}, cannot move to {}",
                current.status, to
            )));
        }
        let moved = self
            .store
            .transition_interview(interview_id, from, to, artifacts, self.clock.now())
            .await?
            .ok_or_else(|| Error::InvalidState("interview changed concurrently".to_string()))?;
        tracing::info!(interview_id = %interview_id, status = %to, "interview status changed");
        Ok(moved)
    }

    /// Write-once scoring. A repeated call returns the stored score untouched and
    /// queues nothing.
    pub async fn finalize(&self, interview_id: Uuid, payload: ScorePayload) -> Result<Finalized> {
        let interview = self.get_interview(interview_id).await?;
        if let Some(existing) = self.store.get_score(interview_id).await? {
            return Ok(Finalized {
                score: existing,
                created: false,
            });
        }
        if interview.status != InterviewStatus::Completed {
            return Err(Error::InvalidState(format!(
                "interview is {}, expected completed",
                interview.status
            )));
        }

        let total = payload
            .total_score
            .or_else(|| weighted_total(&payload.rubric))
            .ok_or_else(|| {
                Error::InvalidInput("rubric or total_score is required".to_string())
            })?;
        let recommendation = payload
            .recommendation
            .unwrap_or_else(|| Recommendation::from_total(total));
        let now = self.clock.now();
        let score = Score {
            id: Uuid::new_v4(),
            interview_id,
            rubric: Json(payload.rubric),
            total_score: total,
            recommendation,
            summary: payload.summary,
            created_at: now,
        };

        let app = self.application(interview.application_id).await?;
        let (candidate, job) = self.parties(&app).await?;
        let variables = BTreeMap::from([
            ("candidate_name".to_string(), candidate.name.clone()),
            ("job_title".to_string(), job.title.clone()),
            ("total_score".to_string(), format!("{:.1}", total)),
            ("recommendation".to_string(), recommendation.to_string()),
        ]);
        let notification = self.tasks.prepare(TaskKind::SendEmail(EmailJob {
            application_id: Some(app.id),
            template: EmailTemplate::ScoreRecorded,
            recipient: self.settings.notify_email.clone(),
            variables,
        }));

        let record = self.store.finalize_score(score, notification, now).await?;
        if record.created {
            tracing::info!(
                %interview_id,
                total_score = record.score.total_score,
                recommendation = %record.score.recommendation,
                "interview score finalized"
            );
        }
        Ok(Finalized {
            score: record.score,
            created: record.created,
        })
    }

    /// Deadline checker: expires overdue invitation tokens and abandons sessions whose
    /// join window has closed.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for link in self.store.list_expired_links(now, SWEEP_BATCH).await? {
            if self.store.expire_link(link.id, now).await? {
                report.expired_links += 1;
            }
        }

        let closed_before = now - self.settings.join_grace;
        for interview in self
            .store
            .list_stale_interviews(closed_before, SWEEP_BATCH)
            .await?
        {
            let moved = self
                .store
                .transition_interview(
                    interview.id,
                    &[InterviewStatus::Scheduled, InterviewStatus::InProgress],
                    InterviewStatus::Abandoned,
                    None,
                    now,
                )
                .await?;
            if moved.is_some() {
                report.abandoned_interviews += 1;
            }
        }

        if report != SweepReport::default() {
            tracing::info!(
                expired_links = report.expired_links,
                abandoned_interviews = report.abandoned_interviews,
                "deadline sweep applied"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rubric(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn weighted_total_uses_fixed_weights() {
        let total = weighted_total(&rubric(&[
            ("technical", 90.0),
            ("communication", 80.0),
            ("cultural_fit", 70.0),
            ("problem_solving", 100.0),
        ]))
        .unwrap();
        assert!((total - 84.5).abs() < 1e-9);
    }

    #[test]
    fn weighted_total_renormalizes_partial_rubrics() {
        let total = weighted_total(&rubric(&[("technical", 90.0), ("communication", 60.0)])).unwrap();
        assert!((total - 76.36).abs() < 1e-9);
    }

    #[test]
    fn unknown_dimensions_are_averaged() {
        let total = weighted_total(&rubric(&[("curiosity", 70.0), ("ownership", 90.0)])).unwrap();
        assert_eq!(total, 80.0);
        assert_eq!(weighted_total(&BTreeMap::new()), None);
    }
}
