use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum EmailTemplate {
    Invite,
    Confirmation,
    ScoreRecorded,
}

impl EmailTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailTemplate::Invite => "invite",
            EmailTemplate::Confirmation => "confirmation",
            EmailTemplate::ScoreRecorded => "score_recorded",
        }
    }
}

impl fmt::Display for EmailTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailJob {
    pub application_id: Option<Uuid>,
    pub template: EmailTemplate,
    pub recipient: String,
    pub variables: BTreeMap<String, String>,
}

/// Unit of background work. Serialized whole into the task payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    SendEmail(EmailJob),
    ParseResume {
        candidate_id: Uuid,
        resume_url: Option<String>,
        resume_text: Option<String>,
    },
    ComputeMatch {
        candidate_id: Uuid,
        job_id: Uuid,
    },
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::SendEmail(_) => "send_email",
            TaskKind::ParseResume { .. } => "parse_resume",
            TaskKind::ComputeMatch { .. } => "compute_match",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub kind: TaskKind,
    pub dedup_key: Option<String>,
    pub serial_key: Option<String>,
    pub max_attempts: i32,
    pub run_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskRecord {
    pub id: Uuid,
    #[sqlx(rename = "payload")]
    pub kind: Json<TaskKind>,
    pub dedup_key: Option<String>,
    pub serial_key: Option<String>,
    pub status: TaskStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub result: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    /// While `running`, the claim is void once this passes and the task is requeued.
    pub lease_until: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn from_new(task: NewTask, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: Json(task.kind),
            dedup_key: task.dedup_key,
            serial_key: task.serial_key,
            status: TaskStatus::Pending,
            attempts: 0,
            max_attempts: task.max_attempts,
            run_at: task.run_at,
            last_error: None,
            result: None,
            created_at: now,
            started_at: None,
            lease_until: None,
            finished_at: None,
        }
    }

    /// A running task with no lease, or one that has passed, is up for release.
    pub fn lease_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.lease_until.map_or(true, |until| until <= now)
    }
}

/// One `(task_type, status)` bucket of the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct TaskCount {
    pub task_type: String,
    pub status: TaskStatus,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_kind_is_tagged_by_type() {
        let kind = TaskKind::ComputeMatch {
            candidate_id: Uuid::nil(),
            job_id: Uuid::nil(),
        };
        let value = serde_json::to_value(&kind).unwrap();
        assert_eq!(value["type"], "compute_match");
        let back: TaskKind = serde_json::from_value(value).unwrap();
        assert_eq!(back, kind);
    }

    #[test]
    fn lease_expires_at_its_deadline() {
        let now = Utc::now();
        let mut task = TaskRecord::from_new(
            NewTask {
                kind: TaskKind::ComputeMatch {
                    candidate_id: Uuid::nil(),
                    job_id: Uuid::nil(),
                },
                dedup_key: None,
                serial_key: None,
                max_attempts: 3,
                run_at: now,
            },
            now,
        );
        assert!(task.lease_expired_at(now));
        task.lease_until = Some(now + chrono::Duration::seconds(30));
        assert!(!task.lease_expired_at(now));
        assert!(task.lease_expired_at(now + chrono::Duration::seconds(30)));
    }
}
