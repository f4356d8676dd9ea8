use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;
use crate::database::Store;
use crate::error::{Error, Result};
use crate::models::email_log::EmailLog;
use crate::models::task::{EmailJob, NewTask, TaskCount, TaskKind, TaskRecord, TaskStatus};
use crate::services::match_service::MatchService;
use crate::services::notification_service::{render, NotificationSink};
use crate::services::resume_service::ResumeParser;
use crate::utils::time::Clock;

/// Bounded exponential backoff: `base * 2^(attempts-1)`, capped.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub base: Duration,
    pub cap: Duration,
    /// How long a claim holds a task before another worker may take it back.
    pub lease: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.task_max_attempts.max(1),
            base: Duration::seconds(config.task_backoff_base_secs),
            cap: Duration::seconds(config.task_backoff_cap_secs),
            lease: Duration::seconds(config.task_lease_secs),
        }
    }

    pub fn backoff(&self, attempts: i32) -> Duration {
        let exponent = (attempts - 1).clamp(0, 30) as u32;
        let secs = self
            .base
            .num_seconds()
            .saturating_mul(2_i64.saturating_pow(exponent));
        Duration::seconds(secs.min(self.cap.num_seconds()))
    }

    /// When the failed task should run again, or `None` when it is done for good.
    pub fn retry_at(&self, task: &TaskRecord, err: &Error, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if err.is_transient() && task.attempts < task.max_attempts {
            Some(now + self.backoff(task.attempts))
        } else {
            None
        }
    }
}

/// Dedup and serial keys follow from the work itself: one pending job per target,
/// and nothing running concurrently for the same application.
pub fn task_keys(kind: &TaskKind) -> (Option<String>, Option<String>) {
    match kind {
        TaskKind::SendEmail(job) => match job.application_id {
            Some(app) => (
                Some(format!("email:{}:{}", job.template, app)),
                Some(format!("application:{}", app)),
            ),
            None => (None, None),
        },
        TaskKind::ParseResume { candidate_id, .. } => (
            Some(format!("parse_resume:{}", candidate_id)),
            Some(format!("candidate:{}", candidate_id)),
        ),
        TaskKind::ComputeMatch {
            candidate_id,
            job_id,
        } => (
            Some(format!("compute_match:{}:{}", candidate_id, job_id)),
            Some(format!("pair:{}:{}", candidate_id, job_id)),
        ),
    }
}

#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl TaskService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, policy: RetryPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Builds a runnable-now task, for callers that enqueue inside their own atomic write.
    pub fn prepare(&self, kind: TaskKind) -> NewTask {
        let (dedup_key, serial_key) = task_keys(&kind);
        NewTask {
            kind,
            dedup_key,
            serial_key,
            max_attempts: self.policy.max_attempts,
            run_at: self.clock.now(),
        }
    }

    pub async fn enqueue(&self, kind: TaskKind) -> Result<TaskRecord> {
        let task = self.prepare(kind);
        let enqueued = self.store.enqueue_task(task, self.clock.now()).await?;
        if let Some(replaced) = enqueued.replaced {
            tracing::info!(task_id = %enqueued.task.id, %replaced, "pending duplicate task cancelled");
        }
        tracing::info!(
            task_id = %enqueued.task.id,
            kind = enqueued.task.kind.name(),
            "task enqueued"
        );
        Ok(enqueued.task)
    }

    pub async fn status(&self, id: Uuid) -> Result<TaskRecord> {
        self.store
            .get_task(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {} not found", id)))
    }

    pub async fn cancel(&self, id: Uuid) -> Result<TaskRecord> {
        if let Some(task) = self.store.cancel_task(id, self.clock.now()).await? {
            tracing::info!(task_id = %id, "task cancelled");
            return Ok(task);
        }
        let task = self.status(id).await?;
        Err(Error::InvalidState(format!(
            "task is {} and can no longer be cancelled",
            task.status
        )))
    }

    /// Tasks currently held by a worker, oldest first.
    pub async fn active(&self, limit: i64) -> Result<Vec<TaskRecord>> {
        self.store.list_tasks(Some(TaskStatus::Running), limit).await
    }

    pub async fn stats(&self) -> Result<Vec<TaskCount>> {
        self.store.count_tasks().await
    }

    /// Claims and executes at most one task. `Ok(false)` when nothing was runnable.
    pub async fn run_once(&self, handler: &TaskHandler) -> Result<bool> {
        let now = self.clock.now();
        let released = self.store.release_expired_leases(now).await?;
        if released > 0 {
            tracing::warn!(released, "released tasks whose worker lease expired");
        }
        let Some(task) = self.store.claim_task(now, now + self.policy.lease).await? else {
            return Ok(false);
        };
        tracing::info!(
            task_id = %task.id,
            kind = task.kind.name(),
            attempt = task.attempts,
            "task started"
        );

        match handler.execute(&task.kind).await {
            Ok(result) => {
                let held = self
                    .store
                    .complete_task(task.id, task.attempts, result, self.clock.now())
                    .await?;
                if held {
                    tracing::info!(task_id = %task.id, "task succeeded");
                } else {
                    tracing::warn!(task_id = %task.id, attempt = task.attempts, "task finished after its lease was lost, result dropped");
                }
            }
            Err(err) => {
                let now = self.clock.now();
                let retry_at = self.policy.retry_at(&task, &err, now);
                let message = format!("{}: {}", err.code(), err);
                match retry_at {
                    Some(at) => tracing::warn!(
                        task_id = %task.id,
                        attempt = task.attempts,
                        retry_at = %at,
                        error = %err,
                        "task failed, will retry"
                    ),
                    None => tracing::error!(
                        task_id = %task.id,
                        attempt = task.attempts,
                        error = %err,
                        "task failed permanently"
                    ),
                }
                let held = self
                    .store
                    .fail_task(task.id, task.attempts, &message, retry_at, now)
                    .await?;
                if !held {
                    tracing::warn!(task_id = %task.id, attempt = task.attempts, "task failed after its lease was lost, outcome dropped");
                }
            }
        }
        Ok(true)
    }

    /// Runs until the queue has nothing runnable at the current clock reading.
    pub async fn drain(&self, handler: &TaskHandler) -> Result<usize> {
        let mut ran = 0;
        while self.run_once(handler).await? {
            ran += 1;
        }
        Ok(ran)
    }
}

/// Executes the payload of one task.
#[derive(Clone)]
pub struct TaskHandler {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn NotificationSink>,
    resumes: ResumeParser,
    matching: MatchService,
    timeout: std::time::Duration,
}

impl TaskHandler {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn NotificationSink>,
        resumes: ResumeParser,
        matching: MatchService,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            store,
            clock,
            sink,
            resumes,
            matching,
            timeout,
        }
    }

    pub async fn execute(&self, kind: &TaskKind) -> Result<JsonValue> {
        match kind {
            TaskKind::SendEmail(job) => self.send_email(job).await,
            TaskKind::ParseResume {
                candidate_id,
                resume_url,
                resume_text,
            } => {
                let resume = match (resume_text, resume_url) {
                    (Some(text), _) => self.resumes.parse_text(text),
                    (None, Some(url)) => self.resumes.parse_url(url).await?,
                    (None, None) => {
                        return Err(Error::InvalidInput(
                            "resume_url or resume_text is required".to_string(),
                        ))
                    }
                };
                let skills = resume.skills.clone();
                self.store
                    .update_candidate_resume(*candidate_id, resume_url.clone(), resume, self.clock.now())
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("candidate {} not found", candidate_id)))?;
                Ok(json!({ "candidate_id": candidate_id, "skills": skills }))
            }
            TaskKind::ComputeMatch {
                candidate_id,
                job_id,
            } => {
                let app = self.matching.match_application(*candidate_id, *job_id).await?;
                Ok(json!({
                    "application_id": app.id,
                    "status": app.status,
                    "score": app.score,
                    "fit": app.fit,
                }))
            }
        }
    }

    async fn send_email(&self, job: &EmailJob) -> Result<JsonValue> {
        let rendered = render(job.template, &job.variables)?;
        let message_id = tokio::time::timeout(
            self.timeout,
            self.sink.send(job.template, &job.recipient, &job.variables),
        )
        .await
        .map_err(|_| Error::UpstreamUnavailable("notification sink timed out".to_string()))??;

        let log = EmailLog {
            id: Uuid::new_v4(),
            application_id: job.application_id,
            template: job.template,
            to_email: job.recipient.clone(),
            subject: rendered.subject,
            provider_message_id: message_id.clone(),
            sent_at: self.clock.now(),
        };
        self.store.record_email(log).await?;
        Ok(json!({ "message_id": message_id }))
    }
}

/// Starts `count` polling workers over the shared queue.
pub fn spawn_workers(tasks: TaskService, handler: TaskHandler, count: usize) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|worker| {
            let tasks = tasks.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                loop {
                    match tasks.run_once(&handler).await {
                        Ok(true) => {}
                        Ok(false) => {
                            tokio::time::sleep(std::time::Duration::from_millis(750)).await;
                        }
                        Err(e) => {
                            tracing::error!(worker, error = ?e, "task worker error");
                            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                        }
                    }
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::{EmailTemplate, TaskStatus};
    use std::collections::BTreeMap;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base: Duration::seconds(30),
            cap: Duration::seconds(3600),
            lease: Duration::seconds(300),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::seconds(30));
        assert_eq!(p.backoff(2), Duration::seconds(60));
        assert_eq!(p.backoff(4), Duration::seconds(240));
        assert_eq!(p.backoff(12), Duration::seconds(3600));
    }

    #[test]
    fn email_keys_are_scoped_to_application() {
        let app = Uuid::new_v4();
        let kind = TaskKind::SendEmail(EmailJob {
            application_id: Some(app),
            template: EmailTemplate::Invite,
            recipient: "a@example.com".into(),
            variables: BTreeMap::new(),
        });
        let (dedup, serial) = task_keys(&kind);
        assert_eq!(dedup, Some(format!("email:invite:{}", app)));
        assert_eq!(serial, Some(format!("application:{}", app)));
    }

    #[test]
    fn only_transient_errors_are_retried() {
        let p = policy();
        let now = Utc::now();
        let mut task = TaskRecord::from_new(
            NewTask {
                kind: TaskKind::ComputeMatch {
                    candidate_id: Uuid::nil(),
                    job_id: Uuid::nil(),
                },
                dedup_key: None,
                serial_key: None,
                max_attempts: 5,
                run_at: now,
            },
            now,
        );
        task.attempts = 1;
        task.status = TaskStatus::Running;
        let upstream = Error::UpstreamUnavailable("down".into());
        assert_eq!(p.retry_at(&task, &upstream, now), Some(now + Duration::seconds(30)));
        assert_eq!(p.retry_at(&task, &Error::InvalidInput("bad".into()), now), None);
        task.attempts = 5;
        assert_eq!(p.retry_at(&task, &upstream, now), None);
    }
}
