pub mod memory;
pub mod pool;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::admin::Admin;
use crate::models::application::{Application, ApplicationStatus, MatchRecord};
use crate::models::availability::AvailabilityReply;
use crate::models::candidate::{Candidate, ParsedResume};
use crate::models::dashboard::DashboardCounts;
use crate::models::email_log::EmailLog;
use crate::models::interview::{Interview, InterviewArtifacts, InterviewStatus};
use crate::models::interview_link::InterviewLink;
use crate::models::job::Job;
use crate::models::score::Score;
use crate::models::task::{NewTask, TaskCount, TaskRecord, TaskStatus};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Result of a write-once score insertion.
#[derive(Debug, Clone)]
pub struct FinalizeRecord {
    pub score: Score,
    /// `false` when a score already existed and was returned untouched.
    pub created: bool,
    pub notification: Option<TaskRecord>,
}

/// Result of enqueueing a task: the new record plus any pending duplicate it replaced.
#[derive(Debug, Clone)]
pub struct Enqueued {
    pub task: TaskRecord,
    pub replaced: Option<Uuid>,
}

/// Durable state for the service.
///
/// Every lifecycle transition is a conditional write: the `from` sets name the
/// statuses a row must currently be in, and `None` comes back when the condition
/// did not hold (another caller won, or the row moved on). Methods that also take a
/// [`NewTask`] enqueue it in the same atomic unit as the state change.
#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn insert_admin(&self, admin: Admin) -> Result<Admin>;
    async fn get_admin(&self, id: Uuid) -> Result<Option<Admin>>;
    async fn find_admin_by_email(&self, email: &str) -> Result<Option<Admin>>;
    async fn record_admin_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;

    async fn insert_candidate(&self, candidate: Candidate) -> Result<Candidate>;
    async fn get_candidate(&self, id: Uuid) -> Result<Option<Candidate>>;
    async fn update_candidate_resume(
        &self,
        id: Uuid,
        resume_url: Option<String>,
        resume: ParsedResume,
        at: DateTime<Utc>,
    ) -> Result<Option<Candidate>>;
    async fn list_candidates(&self, limit: i64, offset: i64) -> Result<Vec<Candidate>>;

    async fn insert_job(&self, job: Job) -> Result<Job>;
    async fn get_job(&self, id: Uuid) -> Result<Option<Job>>;
    async fn update_job(&self, job: Job) -> Result<Option<Job>>;
    async fn list_jobs(&self, limit: i64, offset: i64) -> Result<Vec<Job>>;

    async fn get_application(&self, id: Uuid) -> Result<Option<Application>>;
    /// Newest first.
    async fn list_applications(&self, limit: i64, offset: i64) -> Result<Vec<Application>>;
    async fn find_application(&self, candidate_id: Uuid, job_id: Uuid)
        -> Result<Option<Application>>;
    /// Inserts the application for the pair, or updates it while it is still in
    /// the match phase. `None` when the existing row has moved past matching.
    async fn upsert_match(
        &self,
        record: MatchRecord,
        at: DateTime<Utc>,
    ) -> Result<Option<Application>>;

    /// `from → invited`, expiring any still-issued links of the application,
    /// inserting `link` and enqueueing the invite email.
    async fn open_invitation(
        &self,
        application_id: Uuid,
        from: &[ApplicationStatus],
        link: InterviewLink,
        email: NewTask,
        at: DateTime<Utc>,
    ) -> Result<Option<(InterviewLink, TaskRecord)>>;
    async fn get_link(&self, id: Uuid) -> Result<Option<InterviewLink>>;
    async fn get_link_by_token(&self, token: &str) -> Result<Option<InterviewLink>>;
    /// The most recently issued link of the application, whatever its status.
    async fn latest_link(&self, application_id: Uuid) -> Result<Option<InterviewLink>>;
    /// `issued → expired` for the link and `invited → expired` for its application.
    async fn expire_link(&self, link_id: Uuid, at: DateTime<Utc>) -> Result<bool>;
    /// `issued → confirmed` while `expires_at > at`, application `invited → confirmed`,
    /// and the scheduled interview inserted.
    async fn confirm_link(
        &self,
        link_id: Uuid,
        interview: Interview,
        email: NewTask,
        at: DateTime<Utc>,
    ) -> Result<Option<(Interview, TaskRecord)>>;
    /// The atomic token consumption: link `confirmed → consumed`, interview
    /// `scheduled → in_progress`, application `confirmed → in_progress`.
    async fn consume_link(
        &self,
        link_id: Uuid,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Interview>>;
    async fn list_expired_links(&self, at: DateTime<Utc>, limit: i64) -> Result<Vec<InterviewLink>>;

    async fn get_interview(&self, id: Uuid) -> Result<Option<Interview>>;
    async fn get_interview_by_link(&self, link_id: Uuid) -> Result<Option<Interview>>;
    /// Newest first.
    async fn list_interviews(&self, limit: i64, offset: i64) -> Result<Vec<Interview>>;
    /// Moves the interview and mirrors the change onto its application
    /// (see [`InterviewStatus::application_transition`]).
    async fn transition_interview(
        &self,
        id: Uuid,
        from: &[InterviewStatus],
        to: InterviewStatus,
        artifacts: Option<InterviewArtifacts>,
        at: DateTime<Utc>,
    ) -> Result<Option<Interview>>;
    /// Scheduled or running interviews whose slot ended before `ended_before`.
    async fn list_stale_interviews(
        &self,
        ended_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Interview>>;

    /// Writes the score unless one exists for the interview; the application moves
    /// `completed → scored` and `notification` is enqueued only on first write.
    async fn finalize_score(
        &self,
        score: Score,
        notification: NewTask,
        at: DateTime<Utc>,
    ) -> Result<FinalizeRecord>;
    async fn get_score(&self, interview_id: Uuid) -> Result<Option<Score>>;

    async fn record_email(&self, log: EmailLog) -> Result<EmailLog>;
    async fn list_emails(&self, application_id: Uuid) -> Result<Vec<EmailLog>>;

    async fn record_availability(&self, reply: AvailabilityReply) -> Result<AvailabilityReply>;
    async fn list_availability(&self, application_id: Uuid) -> Result<Vec<AvailabilityReply>>;

    async fn dashboard_counts(&self) -> Result<DashboardCounts>;

    /// Cancels a still-pending task with the same dedup key, then inserts `task`.
    async fn enqueue_task(&self, task: NewTask, at: DateTime<Utc>) -> Result<Enqueued>;
    async fn get_task(&self, id: Uuid) -> Result<Option<TaskRecord>>;
    async fn cancel_task(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<TaskRecord>>;
    /// Tasks in `status` (all when `None`), oldest first.
    async fn list_tasks(&self, status: Option<TaskStatus>, limit: i64) -> Result<Vec<TaskRecord>>;
    async fn count_tasks(&self) -> Result<Vec<TaskCount>>;
    /// Running tasks whose lease ran out go back to `pending` keeping their `run_at`,
    /// or to `failed` once they have used all attempts. Returns how many were touched.
    async fn release_expired_leases(&self, at: DateTime<Utc>) -> Result<u64>;
    /// Claims the oldest runnable task whose serial key has nothing running, holding
    /// it until `lease_until`.
    async fn claim_task(
        &self,
        at: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<TaskRecord>>;
    /// Applies only while the task is still `running` under claim `attempt`;
    /// `false` means the lease was lost and the write was dropped.
    async fn complete_task(
        &self,
        id: Uuid,
        attempt: i32,
        result: JsonValue,
        at: DateTime<Utc>,
    ) -> Result<bool>;
    /// Back to `pending` at `retry_at`, or `failed` when `retry_at` is `None`.
    /// Guarded by `attempt` like [`Store::complete_task`].
    async fn fail_task(
        &self,
        id: Uuid,
        attempt: i32,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<bool>;
}
