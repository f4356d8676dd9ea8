pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use chrono::Duration;
use reqwest::Client;
use std::sync::Arc;

use crate::config::Config;
use crate::database::Store;
use crate::error::{Error, Result};
use crate::services::{
    ai_service::AIService,
    credential_service::{CredentialIssuer, LocalIssuer, RealtimeIssuer},
    dashboard_service::DashboardService,
    identity_service::IdentityService,
    lifecycle_service::{LifecycleService, LifecycleSettings},
    match_service::{KeywordScorer, MatchService, Scorer},
    notification_service::{LogSink, NotificationSink, SendGridSink},
    registry_service::RegistryService,
    reply_service::ReplyService,
    resume_service::ResumeParser,
    task_service::{RetryPolicy, TaskHandler, TaskService},
};
use crate::utils::time::Clock;

/// The three external seams: match scoring, email delivery and session credentials.
#[derive(Clone)]
pub struct Collaborators {
    pub scorer: Arc<dyn Scorer>,
    pub sink: Arc<dyn NotificationSink>,
    pub issuer: Arc<dyn CredentialIssuer>,
}

impl Collaborators {
    /// Provider-backed adapters where keys are configured, local fallbacks otherwise.
    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = http_client(config)?;
        let timeout = std::time::Duration::from_secs(config.upstream_timeout_secs);
        let credential_ttl = Duration::minutes(config.credential_ttl_minutes);

        let (scorer, issuer): (Arc<dyn Scorer>, Arc<dyn CredentialIssuer>) =
            match &config.openai_api_key {
                Some(key) => (
                    Arc::new(AIService::new(
                        key.clone(),
                        config.openai_base_url.clone(),
                        client.clone(),
                        timeout,
                    )),
                    Arc::new(RealtimeIssuer::new(
                        client.clone(),
                        key.clone(),
                        config.openai_base_url.clone(),
                        clock.clone(),
                        credential_ttl,
                    )),
                ),
                None => {
                    tracing::warn!("OPENAI_API_KEY not set, using keyword scorer and local session credentials");
                    (
                        Arc::new(KeywordScorer),
                        Arc::new(LocalIssuer::new(clock.clone(), credential_ttl)),
                    )
                }
            };

        let sink: Arc<dyn NotificationSink> = match &config.sendgrid_api_key {
            Some(key) => Arc::new(SendGridSink::new(
                client,
                key.clone(),
                config.from_email.clone(),
                timeout,
            )),
            None => {
                tracing::warn!("SENDGRID_API_KEY not set, emails will only be logged");
                Arc::new(LogSink)
            }
        };

        Ok(Self {
            scorer,
            sink,
            issuer,
        })
    }
}

pub fn http_client(config: &Config) -> Result<Client> {
    Client::builder()
        .timeout(std::time::Duration::from_secs(
            config.upstream_timeout_secs.saturating_mul(4).max(1),
        ))
        .build()
        .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub identity: IdentityService,
    pub registry: RegistryService,
    pub matching: MatchService,
    pub lifecycle: LifecycleService,
    pub replies: ReplyService,
    pub dashboard: DashboardService,
    pub tasks: TaskService,
    pub handler: TaskHandler,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        config: &Config,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let timeout = std::time::Duration::from_secs(config.upstream_timeout_secs);
        let resumes = ResumeParser::new(http_client(config)?, timeout);

        let identity = IdentityService::new(store.clone(), clock.clone(), config);
        let tasks = TaskService::new(store.clone(), clock.clone(), RetryPolicy::from_config(config));
        let matching = MatchService::new(
            store.clone(),
            clock.clone(),
            collaborators.scorer,
            config.match_threshold,
            timeout,
        );
        let registry = RegistryService::new(
            store.clone(),
            clock.clone(),
            tasks.clone(),
            resumes.clone(),
        );
        let lifecycle = LifecycleService::new(
            store.clone(),
            clock.clone(),
            identity.clone(),
            tasks.clone(),
            collaborators.issuer,
            LifecycleSettings::from_config(config),
        );
        let replies = ReplyService::new(store.clone(), clock.clone(), lifecycle.clone(), config)?;
        let dashboard = DashboardService::new(store.clone());
        let handler = TaskHandler::new(
            store.clone(),
            clock.clone(),
            collaborators.sink,
            resumes,
            matching.clone(),
            timeout,
        );

        Ok(Self {
            store,
            clock,
            identity,
            registry,
            matching,
            lifecycle,
            replies,
            dashboard,
            tasks,
            handler,
        })
    }
}
