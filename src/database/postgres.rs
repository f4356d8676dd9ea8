use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{Enqueued, FinalizeRecord, Store};
use crate::error::{Error, Result};
use crate::models::admin::Admin;
use crate::models::application::{Application, ApplicationStatus, MatchRecord};
use crate::models::availability::AvailabilityReply;
use crate::models::candidate::{Candidate, ParsedResume};
use crate::models::dashboard::DashboardCounts;
use crate::models::email_log::EmailLog;
use crate::models::interview::{Interview, InterviewArtifacts, InterviewStatus};
use crate::models::interview_link::{InterviewLink, LinkStatus};
use crate::models::job::Job;
use crate::models::score::Score;
use crate::models::task::{NewTask, TaskCount, TaskRecord, TaskStatus};

/// Postgres-backed store. Conditional transitions are `UPDATE ... WHERE status = ANY(..)`
/// inside a transaction; zero affected rows means the caller lost the race.
#[derive(Clone)]
pub struct PgStore {
    pub pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Conditional application move inside an open transaction.
async fn move_application(
    conn: &mut PgConnection,
    id: Uuid,
    from: &[ApplicationStatus],
    to: ApplicationStatus,
    at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE applications SET status = $3, version = version + 1, updated_at = $4
        WHERE id = $1 AND status = ANY($2)
        "#,
    )
    .bind(id)
    .bind(from)
    .bind(to)
    .bind(at)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Replaces a pending duplicate (same dedup key) and inserts the task.
async fn push_task(conn: &mut PgConnection, task: NewTask, at: DateTime<Utc>) -> Result<Enqueued> {
    let mut replaced = None;
    if let Some(key) = task.dedup_key.as_deref() {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(key)
            .execute(&mut *conn)
            .await?;
        let superseded: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE tasks SET status = 'cancelled', finished_at = $2,
                   last_error = 'superseded by a newer task'
            WHERE dedup_key = $1 AND status = 'pending'
            RETURNING id
            "#,
        )
        .bind(key)
        .bind(at)
        .fetch_all(&mut *conn)
        .await?;
        replaced = superseded.last().copied();
    }

    let record = TaskRecord::from_new(task, at);
    let task = sqlx::query_as::<_, TaskRecord>(
        r#"
        INSERT INTO tasks (id, task_type, payload, dedup_key, serial_key, status, attempts,
                           max_attempts, run_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, 0, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(record.id)
    .bind(record.kind.name())
    .bind(&record.kind)
    .bind(&record.dedup_key)
    .bind(&record.serial_key)
    .bind(record.status)
    .bind(record.max_attempts)
    .bind(record.run_at)
    .bind(record.created_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(Enqueued { task, replaced })
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_admin(&self, admin: Admin) -> Result<Admin> {
        let inserted = sqlx::query_as::<_, Admin>(
            r#"
            INSERT INTO admins (id, email, password_hash, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (email) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(admin.id)
        .bind(&admin.email)
        .bind(&admin.password_hash)
        .bind(admin.is_active)
        .bind(admin.created_at)
        .fetch_optional(&self.pool)
        .await?;
        inserted.ok_or_else(|| {
            Error::InvalidState(format!("admin {} already exists", admin.email))
        })
    }

    async fn get_admin(&self, id: Uuid) -> Result<Option<Admin>> {
        let admin = sqlx::query_as::<_, Admin>("SELECT * FROM admins WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(admin)
    }

    async fn find_admin_by_email(&self, email: &str) -> Result<Option<Admin>> {
        let admin =
            sqlx::query_as::<_, Admin>("SELECT * FROM admins WHERE lower(email) = lower($1)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(admin)
    }

    async fn record_admin_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE admins SET last_login_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_candidate(&self, candidate: Candidate) -> Result<Candidate> {
        let candidate = sqlx::query_as::<_, Candidate>(
            r#"
            INSERT INTO candidates (id, name, email, phone, resume_url, resume, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(candidate.id)
        .bind(&candidate.name)
        .bind(&candidate.email)
        .bind(&candidate.phone)
        .bind(&candidate.resume_url)
        .bind(&candidate.resume)
        .bind(candidate.created_at)
        .bind(candidate.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(candidate)
    }

    async fn get_candidate(&self, id: Uuid) -> Result<Option<Candidate>> {
        let candidate = sqlx::query_as::<_, Candidate>("SELECT * FROM candidates WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(candidate)
    }

    async fn update_candidate_resume(
        &self,
        id: Uuid,
        resume_url: Option<String>,
        resume: ParsedResume,
        at: DateTime<Utc>,
    ) -> Result<Option<Candidate>> {
        let candidate = sqlx::query_as::<_, Candidate>(
            r#"
            UPDATE candidates
            SET resume_url = COALESCE($2, resume_url), resume = $3, updated_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(resume_url)
        .bind(Json(resume))
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(candidate)
    }

    async fn list_candidates(&self, limit: i64, offset: i64) -> Result<Vec<Candidate>> {
        let candidates = sqlx::query_as::<_, Candidate>(
            "SELECT * FROM candidates ORDER BY created_at DESC, id LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(candidates)
    }

    async fn insert_job(&self, job: Job) -> Result<Job> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (id, title, description, must_have, nice_to_have, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(job.id)
        .bind(&job.title)
        .bind(&job.description)
        .bind(&job.must_have)
        .bind(&job.nice_to_have)
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    async fn update_job(&self, job: Job) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET title = $2, description = $3, must_have = $4, nice_to_have = $5, updated_at = $6
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(job.id)
        .bind(&job.title)
        .bind(&job.description)
        .bind(&job.must_have)
        .bind(&job.nice_to_have)
        .bind(job.updated_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    async fn list_jobs(&self, limit: i64, offset: i64) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs ORDER BY created_at DESC, id LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn get_application(&self, id: Uuid) -> Result<Option<Application>> {
        let application =
            sqlx::query_as::<_, Application>("SELECT * FROM applications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(application)
    }

    async fn list_applications(&self, limit: i64, offset: i64) -> Result<Vec<Application>> {
        let applications = sqlx::query_as::<_, Application>(
            "SELECT * FROM applications ORDER BY created_at DESC, id LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(applications)
    }

    async fn find_application(
        &self,
        candidate_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<Application>> {
        let application = sqlx::query_as::<_, Application>(
            "SELECT * FROM applications WHERE candidate_id = $1 AND job_id = $2",
        )
        .bind(candidate_id)
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(application)
    }

    async fn upsert_match(
        &self,
        record: MatchRecord,
        at: DateTime<Utc>,
    ) -> Result<Option<Application>> {
        let application = sqlx::query_as::<_, Application>(
            r#"
            INSERT INTO applications (id, candidate_id, job_id, score, fit, reasons, status,
                                      version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 1, $8, $8)
            ON CONFLICT (candidate_id, job_id) DO UPDATE
            SET score = EXCLUDED.score, fit = EXCLUDED.fit, reasons = EXCLUDED.reasons,
                status = EXCLUDED.status, version = applications.version + 1,
                updated_at = EXCLUDED.updated_at
            WHERE applications.status = ANY($9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(record.candidate_id)
        .bind(record.job_id)
        .bind(record.score)
        .bind(record.fit)
        .bind(&record.reasons)
        .bind(record.status)
        .bind(at)
        .bind(&ApplicationStatus::MATCH_PHASE[..])
        .fetch_optional(&self.pool)
        .await?;
        Ok(application)
    }

    async fn open_invitation(
        &self,
        application_id: Uuid,
        from: &[ApplicationStatus],
        link: InterviewLink,
        email: NewTask,
        at: DateTime<Utc>,
    ) -> Result<Option<(InterviewLink, TaskRecord)>> {
        let mut tx = self.pool.begin().await?;
        if !move_application(&mut tx, application_id, from, ApplicationStatus::Invited, at).await? {
            return Ok(None);
        }
        sqlx::query(
            "UPDATE interview_links SET status = $2 WHERE application_id = $1 AND status = $3",
        )
        .bind(application_id)
        .bind(LinkStatus::Expired)
        .bind(LinkStatus::Issued)
        .execute(&mut *tx)
        .await?;
        let link = sqlx::query_as::<_, InterviewLink>(
            r#"
            INSERT INTO interview_links (id, application_id, token, status, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(link.id)
        .bind(link.application_id)
        .bind(&link.token)
        .bind(link.status)
        .bind(link.expires_at)
        .bind(link.created_at)
        .fetch_one(&mut *tx)
        .await?;
        let enqueued = push_task(&mut tx, email, at).await?;
        tx.commit().await?;
        Ok(Some((link, enqueued.task)))
    }

    async fn get_link(&self, id: Uuid) -> Result<Option<InterviewLink>> {
        let link = sqlx::query_as::<_, InterviewLink>("SELECT * FROM interview_links WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(link)
    }

    async fn get_link_by_token(&self, token: &str) -> Result<Option<InterviewLink>> {
        let link =
            sqlx::query_as::<_, InterviewLink>("SELECT * FROM interview_links WHERE token = $1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
        Ok(link)
    }

    async fn latest_link(&self, application_id: Uuid) -> Result<Option<InterviewLink>> {
        let link = sqlx::query_as::<_, InterviewLink>(
            r#"
            SELECT * FROM interview_links WHERE application_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(link)
    }

    async fn expire_link(&self, link_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let application_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE interview_links SET status = 'expired'
            WHERE id = $1 AND status = 'issued'
            RETURNING application_id
            "#,
        )
        .bind(link_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(application_id) = application_id else {
            return Ok(false);
        };
        move_application(
            &mut tx,
            application_id,
            &[ApplicationStatus::Invited],
            ApplicationStatus::Expired,
            at,
        )
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn confirm_link(
        &self,
        link_id: Uuid,
        interview: Interview,
        email: NewTask,
        at: DateTime<Utc>,
    ) -> Result<Option<(Interview, TaskRecord)>> {
        let mut tx = self.pool.begin().await?;
        let application_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE interview_links SET status = 'confirmed', confirmed_at = $2
            WHERE id = $1 AND status = 'issued' AND expires_at > $2
            RETURNING application_id
            "#,
        )
        .bind(link_id)
        .bind(at)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(application_id) = application_id else {
            return Ok(None);
        };

        let (from, to) = InterviewStatus::Scheduled.application_transition();
        if !move_application(&mut tx, application_id, from, to, at).await? {
            return Ok(None);
        }

        let interview = sqlx::query_as::<_, Interview>(
            r#"
            INSERT INTO interviews (id, application_id, link_id, start_at, end_at, status,
                                    created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(interview.id)
        .bind(interview.application_id)
        .bind(interview.link_id)
        .bind(interview.start_at)
        .bind(interview.end_at)
        .bind(interview.status)
        .bind(interview.created_at)
        .bind(interview.updated_at)
        .fetch_one(&mut *tx)
        .await?;
        let enqueued = push_task(&mut tx, email, at).await?;
        tx.commit().await?;
        Ok(Some((interview, enqueued.task)))
    }

    async fn consume_link(
        &self,
        link_id: Uuid,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Interview>> {
        let mut tx = self.pool.begin().await?;
        let consumed = sqlx::query(
            r#"
            UPDATE interview_links SET status = 'consumed', consumed_at = $2
            WHERE id = $1 AND status = 'confirmed'
            "#,
        )
        .bind(link_id)
        .bind(at)
        .execute(&mut *tx)
        .await?;
        if consumed.rows_affected() != 1 {
            return Ok(None);
        }

        let interview = sqlx::query_as::<_, Interview>(
            r#"
            UPDATE interviews
            SET status = 'in_progress', session_id = $2, session_started_at = $3, updated_at = $3
            WHERE link_id = $1 AND status = 'scheduled'
            RETURNING *
            "#,
        )
        .bind(link_id)
        .bind(session_id)
        .bind(at)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(interview) = interview else {
            return Ok(None);
        };

        let (from, to) = InterviewStatus::InProgress.application_transition();
        if !move_application(&mut tx, interview.application_id, from, to, at).await? {
            return Ok(None);
        }
        tx.commit().await?;
        Ok(Some(interview))
    }

    async fn list_expired_links(
        &self,
        at: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<InterviewLink>> {
        let links = sqlx::query_as::<_, InterviewLink>(
            r#"
            SELECT * FROM interview_links
            WHERE status = 'issued' AND expires_at <= $1
            ORDER BY expires_at
            LIMIT $2
            "#,
        )
        .bind(at)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(links)
    }

    async fn get_interview(&self, id: Uuid) -> Result<Option<Interview>> {
        let interview = sqlx::query_as::<_, Interview>("SELECT * FROM interviews WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(interview)
    }

    async fn get_interview_by_link(&self, link_id: Uuid) -> Result<Option<Interview>> {
        let interview =
            sqlx::query_as::<_, Interview>("SELECT * FROM interviews WHERE link_id = $1")
                .bind(link_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(interview)
    }

    async fn list_interviews(&self, limit: i64, offset: i64) -> Result<Vec<Interview>> {
        let interviews = sqlx::query_as::<_, Interview>(
            "SELECT * FROM interviews ORDER BY created_at DESC, id LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(interviews)
    }

    async fn transition_interview(
        &self,
        id: Uuid,
        from: &[InterviewStatus],
        to: InterviewStatus,
        artifacts: Option<InterviewArtifacts>,
        at: DateTime<Utc>,
    ) -> Result<Option<Interview>> {
        let artifacts = artifacts.unwrap_or_default();
        let mut tx = self.pool.begin().await?;
        let interview = sqlx::query_as::<_, Interview>(
            r#"
            UPDATE interviews
            SET status = $3, updated_at = $4,
                audio_url = COALESCE($5, audio_url),
                transcript_url = COALESCE($6, transcript_url)
            WHERE id = $1 AND status = ANY($2)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(at)
        .bind(artifacts.audio_url)
        .bind(artifacts.transcript_url)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(interview) = interview else {
            return Ok(None);
        };

        let (app_from, app_to) = to.application_transition();
        move_application(&mut tx, interview.application_id, app_from, app_to, at).await?;
        tx.commit().await?;
        Ok(Some(interview))
    }

    async fn list_stale_interviews(
        &self,
        ended_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Interview>> {
        let interviews = sqlx::query_as::<_, Interview>(
            r#"
            SELECT * FROM interviews
            WHERE status IN ('scheduled', 'in_progress') AND end_at < $1
            ORDER BY end_at
            LIMIT $2
            "#,
        )
        .bind(ended_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(interviews)
    }

    async fn finalize_score(
        &self,
        score: Score,
        notification: NewTask,
        at: DateTime<Utc>,
    ) -> Result<FinalizeRecord> {
        let mut tx = self.pool.begin().await?;
        // Row lock serializes concurrent finalizers of the same interview.
        let locked = sqlx::query_as::<_, (Uuid, InterviewStatus)>(
            "SELECT application_id, status FROM interviews WHERE id = $1 FOR UPDATE",
        )
        .bind(score.interview_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((application_id, status)) = locked else {
            return Err(Error::NotFound(format!(
                "interview {} not found",
                score.interview_id
            )));
        };

        let existing = sqlx::query_as::<_, Score>("SELECT * FROM scores WHERE interview_id = $1")
            .bind(score.interview_id)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(existing) = existing {
            return Ok(FinalizeRecord {
                score: existing,
                created: false,
                notification: None,
            });
        }

        if status != InterviewStatus::Completed {
            return Err(Error::InvalidState(format!(
                "interview is {}, not completed",
                status
            )));
        }

        let stored = sqlx::query_as::<_, Score>(
            r#"
            INSERT INTO scores (id, interview_id, rubric, total_score, recommendation, summary, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(score.id)
        .bind(score.interview_id)
        .bind(&score.rubric)
        .bind(score.total_score)
        .bind(score.recommendation)
        .bind(&score.summary)
        .bind(score.created_at)
        .fetch_one(&mut *tx)
        .await?;

        move_application(
            &mut tx,
            application_id,
            &[ApplicationStatus::Completed],
            ApplicationStatus::Scored,
            at,
        )
        .await?;
        let enqueued = push_task(&mut tx, notification, at).await?;
        tx.commit().await?;

        Ok(FinalizeRecord {
            score: stored,
            created: true,
            notification: Some(enqueued.task),
        })
    }

    async fn get_score(&self, interview_id: Uuid) -> Result<Option<Score>> {
        let score = sqlx::query_as::<_, Score>("SELECT * FROM scores WHERE interview_id = $1")
            .bind(interview_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(score)
    }

    async fn record_email(&self, log: EmailLog) -> Result<EmailLog> {
        let log = sqlx::query_as::<_, EmailLog>(
            r#"
            INSERT INTO email_logs (id, application_id, template, to_email, subject,
                                    provider_message_id, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(log.id)
        .bind(log.application_id)
        .bind(log.template)
        .bind(&log.to_email)
        .bind(&log.subject)
        .bind(&log.provider_message_id)
        .bind(log.sent_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(log)
    }

    async fn list_emails(&self, application_id: Uuid) -> Result<Vec<EmailLog>> {
        let logs = sqlx::query_as::<_, EmailLog>(
            "SELECT * FROM email_logs WHERE application_id = $1 ORDER BY sent_at",
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }

    async fn record_availability(&self, reply: AvailabilityReply) -> Result<AvailabilityReply> {
        let reply = sqlx::query_as::<_, AvailabilityReply>(
            r#"
            INSERT INTO availability_replies (id, application_id, raw_text, parsed_slots,
                                              chosen_slot, interview_id, outcome, received_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(reply.id)
        .bind(reply.application_id)
        .bind(&reply.raw_text)
        .bind(&reply.parsed_slots)
        .bind(&reply.chosen_slot)
        .bind(reply.interview_id)
        .bind(&reply.outcome)
        .bind(reply.received_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(reply)
    }

    async fn list_availability(&self, application_id: Uuid) -> Result<Vec<AvailabilityReply>> {
        let replies = sqlx::query_as::<_, AvailabilityReply>(
            "SELECT * FROM availability_replies WHERE application_id = $1 ORDER BY received_at",
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(replies)
    }

    async fn dashboard_counts(&self) -> Result<DashboardCounts> {
        let counts = sqlx::query_as::<_, DashboardCounts>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM jobs) AS total_jobs,
                (SELECT COUNT(*) FROM candidates) AS total_candidates,
                (SELECT COUNT(*) FROM applications) AS total_applications,
                (SELECT COUNT(*) FROM applications WHERE fit = 'fit') AS fit_applications,
                (SELECT COUNT(*) FROM applications WHERE fit = 'borderline') AS borderline_applications,
                (SELECT COUNT(*) FROM applications WHERE fit = 'not_fit') AS not_fit_applications,
                (SELECT COUNT(*) FROM interviews WHERE status = 'scheduled') AS scheduled_interviews,
                (SELECT COUNT(*) FROM interviews WHERE status = 'in_progress') AS in_progress_interviews,
                (SELECT COUNT(*) FROM interviews WHERE status = 'completed') AS completed_interviews,
                (SELECT COUNT(*) FROM scores) AS scored_interviews
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(counts)
    }

    async fn enqueue_task(&self, task: NewTask, at: DateTime<Utc>) -> Result<Enqueued> {
        let mut tx = self.pool.begin().await?;
        let enqueued = push_task(&mut tx, task, at).await?;
        tx.commit().await?;
        Ok(enqueued)
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<TaskRecord>> {
        let task = sqlx::query_as::<_, TaskRecord>("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(task)
    }

    async fn cancel_task(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<TaskRecord>> {
        let task = sqlx::query_as::<_, TaskRecord>(
            r#"
            UPDATE tasks SET status = 'cancelled', finished_at = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    async fn list_tasks(&self, status: Option<TaskStatus>, limit: i64) -> Result<Vec<TaskRecord>> {
        let tasks = sqlx::query_as::<_, TaskRecord>(
            r#"
            SELECT * FROM tasks
            WHERE $1::text IS NULL OR status = $1
            ORDER BY created_at
            LIMIT $2
            "#,
        )
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    async fn count_tasks(&self) -> Result<Vec<TaskCount>> {
        let counts = sqlx::query_as::<_, TaskCount>(
            r#"
            SELECT task_type, status, COUNT(*) AS count
            FROM tasks
            GROUP BY task_type, status
            ORDER BY task_type, status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(counts)
    }

    async fn release_expired_leases(&self, at: DateTime<Utc>) -> Result<u64> {
        let released = sqlx::query(
            r#"
            UPDATE tasks
            SET status = CASE WHEN attempts >= max_attempts THEN 'failed' ELSE 'pending' END,
                finished_at = CASE WHEN attempts >= max_attempts THEN $1 ELSE NULL END,
                last_error = 'lease expired while running',
                lease_until = NULL
            WHERE status = 'running' AND (lease_until IS NULL OR lease_until <= $1)
            "#,
        )
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(released.rows_affected())
    }

    async fn claim_task(
        &self,
        at: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<TaskRecord>> {
        let claimed = sqlx::query_as::<_, TaskRecord>(
            r#"
            UPDATE tasks
            SET status = 'running', attempts = attempts + 1, started_at = $1, lease_until = $2
            WHERE id = (
                SELECT t.id FROM tasks t
                WHERE t.status = 'pending' AND t.run_at <= $1
                  AND (t.serial_key IS NULL OR NOT EXISTS (
                        SELECT 1 FROM tasks r
                        WHERE r.serial_key = t.serial_key AND r.status = 'running'
                          AND r.lease_until > $1))
                ORDER BY t.run_at, t.created_at
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(at)
        .bind(lease_until)
        .fetch_optional(&self.pool)
        .await;
        match claimed {
            Ok(task) => Ok(task),
            // Another worker started a task with the same serial key first, or an
            // expired holder has not been released yet.
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn complete_task(
        &self,
        id: Uuid,
        attempt: i32,
        result: JsonValue,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let done = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'succeeded', result = $3, last_error = NULL, lease_until = NULL,
                finished_at = $4
            WHERE id = $1 AND status = 'running' AND attempts = $2
            "#,
        )
        .bind(id)
        .bind(attempt)
        .bind(result)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() == 1)
    }

    async fn fail_task(
        &self,
        id: Uuid,
        attempt: i32,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let failed = match retry_at {
            Some(retry_at) => {
                sqlx::query(
                    r#"
                    UPDATE tasks
                    SET status = 'pending', last_error = $3, run_at = $4, lease_until = NULL
                    WHERE id = $1 AND status = 'running' AND attempts = $2
                    "#,
                )
                .bind(id)
                .bind(attempt)
                .bind(error)
                .bind(retry_at)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE tasks
                    SET status = 'failed', last_error = $3, finished_at = $4, lease_until = NULL
                    WHERE id = $1 AND status = 'running' AND attempts = $2
                    "#,
                )
                .bind(id)
                .bind(attempt)
                .bind(error)
                .bind(at)
                .execute(&self.pool)
                .await?
            }
        };
        Ok(failed.rows_affected() == 1)
    }
}
