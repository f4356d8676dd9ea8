#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use interview_backend::{
    config::Config,
    database::{MemoryStore, Store},
    dto::intake_dto::{IntakeCandidate, IntakeJob},
    error::{Error, Result},
    models::application::Application,
    models::interview::ScheduleSlot,
    models::task::EmailTemplate,
    services::credential_service::{CredentialIssuer, LocalIssuer, SessionCredentials},
    services::match_service::{CandidateProfile, JobProfile, MatchScore, Scorer},
    services::notification_service::NotificationSink,
    utils::time::ManualClock,
    AppState, Collaborators,
};

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "correct horse battery";

/// Scorer with a fixed answer that can be switched into failure mode.
pub struct FakeScorer {
    pub score: Mutex<f64>,
    pub failing: Mutex<bool>,
    pub calls: AtomicUsize,
}

impl FakeScorer {
    pub fn new(score: f64) -> Self {
        Self {
            score: Mutex::new(score),
            failing: Mutex::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn set_score(&self, score: f64) {
        *self.score.lock().unwrap() = score;
    }
}

#[async_trait]
impl Scorer for FakeScorer {
    async fn score(&self, _candidate: &CandidateProfile, _job: &JobProfile) -> Result<MatchScore> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock().unwrap() {
            return Err(Error::UpstreamUnavailable("scorer down".into()));
        }
        Ok(MatchScore {
            score: *self.score.lock().unwrap(),
            reasons: vec!["fake".into()],
        })
    }
}

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub template: EmailTemplate,
    pub recipient: String,
    pub variables: BTreeMap<String, String>,
}

/// Records accepted sends; the next `fail_next` sends fail transiently.
#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<SentEmail>>,
    pub fail_next: AtomicUsize,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self, template: EmailTemplate) -> usize {
        self.sent().iter().filter(|e| e.template == template).count()
    }

    pub fn fail_times(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(
        &self,
        template: EmailTemplate,
        recipient: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<String> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::UpstreamUnavailable("sink down".into()));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(SentEmail {
            template,
            recipient: recipient.to_string(),
            variables: variables.clone(),
        });
        Ok(format!("msg-{}", sent.len()))
    }
}

/// Local issuer that counts calls and can be switched off.
pub struct CountingIssuer {
    inner: LocalIssuer,
    pub calls: AtomicUsize,
    pub failing: Mutex<bool>,
}

#[async_trait]
impl CredentialIssuer for CountingIssuer {
    async fn issue(&self, session_id: &str) -> Result<SessionCredentials> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock().unwrap() {
            return Err(Error::UpstreamUnavailable("issuer down".into()));
        }
        self.inner.issue(session_id).await
    }
}

impl CountingIssuer {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            inner: LocalIssuer::new(Arc::new(clock), Duration::minutes(10)),
            calls: AtomicUsize::new(0),
            failing: Mutex::new(false),
        }
    }
}

pub fn test_config() -> Config {
    Config {
        jwt_secret: "test_secret_key_for_interviews".into(),
        admin_email: ADMIN_EMAIL.into(),
        admin_password: Some(ADMIN_PASSWORD.into()),
        app_base_url: "http://interviews.test".into(),
        public_rps: 1000,
        ..Config::default()
    }
}

/// Fakes wired around `store`, sharing `clock`.
pub struct Harness {
    pub state: AppState,
    pub scorer: Arc<FakeScorer>,
    pub sink: Arc<RecordingSink>,
    pub issuer: Arc<CountingIssuer>,
}

pub fn harness(store: Arc<dyn Store>, config: &Config, clock: &ManualClock) -> Harness {
    let scorer = Arc::new(FakeScorer::new(0.9));
    let sink = Arc::new(RecordingSink::default());
    let issuer = Arc::new(CountingIssuer::new(clock.clone()));
    let collaborators = Collaborators {
        scorer: scorer.clone(),
        sink: sink.clone(),
        issuer: issuer.clone(),
    };
    let state =
        AppState::new(store, config, collaborators, Arc::new(clock.clone())).expect("app state");
    Harness {
        state,
        scorer,
        sink,
        issuer,
    }
}

/// Candidate + job matched by the fake scorer.
pub async fn matched_application(state: &AppState, email: &str) -> Application {
    let candidate = state
        .registry
        .create_candidate(IntakeCandidate {
            name: "Ada Lovelace".into(),
            email: email.into(),
            phone: None,
            resume_url: None,
            resume_text: Some(
                "Senior engineer with 8 years of experience in Rust, PostgreSQL and Docker. \
                 MSc Computer Science, University of London."
                    .into(),
            ),
        })
        .await
        .expect("candidate");
    let job = state
        .registry
        .create_job(IntakeJob {
            title: "Backend Engineer".into(),
            description: "Build the interview platform".into(),
            must_have: vec!["Rust".into(), "PostgreSQL".into()],
            nice_to_have: vec!["Docker".into()],
        })
        .await
        .expect("job");
    state
        .matching
        .match_application(candidate.candidate.id, job.id)
        .await
        .expect("match")
}

pub struct TestApp {
    pub state: AppState,
    pub config: Config,
    pub store: Arc<MemoryStore>,
    pub clock: ManualClock,
    pub scorer: Arc<FakeScorer>,
    pub sink: Arc<RecordingSink>,
    pub issuer: Arc<CountingIssuer>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap());
        let store = Arc::new(MemoryStore::new());
        let Harness {
            state,
            scorer,
            sink,
            issuer,
        } = harness(store.clone(), &config, &clock);
        Self {
            state,
            config,
            store,
            clock,
            scorer,
            sink,
            issuer,
        }
    }

    pub fn router(&self) -> axum::Router {
        interview_backend::routes::build_router(self.state.clone(), &self.config)
    }

    pub async fn drain(&self) -> usize {
        self.state
            .tasks
            .drain(&self.state.handler)
            .await
            .expect("drain tasks")
    }

    pub async fn matched_application(&self, email: &str) -> Application {
        matched_application(&self.state, email).await
    }

    /// A one-hour slot starting a day from the current clock reading.
    pub fn slot_tomorrow(&self) -> ScheduleSlot {
        use interview_backend::utils::time::Clock;
        let start = self.clock.now() + Duration::hours(24);
        ScheduleSlot {
            start,
            end: start + Duration::hours(1),
        }
    }
}
