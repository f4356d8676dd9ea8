use std::sync::Arc;
use uuid::Uuid;

use crate::database::Store;
use crate::error::Result;
use crate::models::dashboard::{Activity, ActivityKind, DashboardCounts};

const PER_KIND: i64 = 5;
const FEED_LEN: usize = 10;

/// Read-only aggregates for the admin overview.
#[derive(Clone)]
pub struct DashboardService {
    store: Arc<dyn Store>,
}

impl DashboardService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn stats(&self) -> Result<DashboardCounts> {
        self.store.dashboard_counts().await
    }

    /// The newest applications, interviews and candidates merged into one feed,
    /// newest first.
    pub async fn recent_activity(&self) -> Result<Vec<Activity>> {
        let mut feed = Vec::new();

        for app in self.store.list_applications(PER_KIND, 0).await? {
            let (name, title) = self.names(app.candidate_id, app.job_id).await?;
            feed.push(Activity {
                id: app.id,
                kind: ActivityKind::Application,
                description: format!("New application: {} for {}", name, title),
                status: Some(app.status.to_string()),
                timestamp: app.created_at,
            });
        }

        for interview in self.store.list_interviews(PER_KIND, 0).await? {
            let description = match self.store.get_application(interview.application_id).await? {
                Some(app) => {
                    let (name, title) = self.names(app.candidate_id, app.job_id).await?;
                    format!("Interview {}: {} for {}", interview.status, name, title)
                }
                None => format!("Interview {}", interview.status),
            };
            feed.push(Activity {
                id: interview.id,
                kind: ActivityKind::Interview,
                description,
                status: Some(interview.status.to_string()),
                timestamp: interview.created_at,
            });
        }

        for candidate in self.store.list_candidates(PER_KIND, 0).await? {
            feed.push(Activity {
                id: candidate.id,
                kind: ActivityKind::Candidate,
                description: format!("New candidate registered: {}", candidate.name),
                status: None,
                timestamp: candidate.created_at,
            });
        }

        feed.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        feed.truncate(FEED_LEN);
        Ok(feed)
    }

    async fn names(&self, candidate_id: Uuid, job_id: Uuid) -> Result<(String, String)> {
        let name = self
            .store
            .get_candidate(candidate_id)
            .await?
            .map_or_else(|| "unknown candidate".to_string(), |c| c.name);
        let title = self
            .store
            .get_job(job_id)
            .await?
            .map_or_else(|| "unknown job".to_string(), |j| j.title);
        Ok((name, title))
    }
}
