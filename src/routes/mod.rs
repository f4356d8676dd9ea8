pub mod auth;
pub mod dashboard;
pub mod email_inbound;
pub mod health;
pub mod intake;
pub mod interview;
pub mod matching;
pub mod scoring;
pub mod tasks;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::middleware::{auth::require_admin, cors::cors_layer, rate_limit};
use crate::AppState;

const BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

pub fn build_router(state: AppState, config: &Config) -> Router {
    let base_routes = Router::new()
        .route("/health", get(health::health))
        .route("/auth/login", post(auth::login))
        .route("/auth/init-admin", post(auth::init_admin));

    let admin_api = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/logout", post(auth::logout))
        .route("/dashboard/stats", get(dashboard::stats))
        .route("/dashboard/recent-activity", get(dashboard::recent_activity))
        .route(
            "/intake/candidate",
            post(intake::create_candidate),
        )
        .route("/intake/candidates", get(intake::list_candidates))
        .route("/intake/candidate/:id", get(intake::get_candidate))
        .route(
            "/intake/candidate/:id/resume",
            patch(intake::update_resume),
        )
        .route("/intake/job", post(intake::create_job))
        .route("/intake/jobs", get(intake::list_jobs))
        .route(
            "/intake/job/:id",
            get(intake::get_job).patch(intake::update_job),
        )
        .route("/match", post(matching::match_pair))
        .route("/applications/:id", get(matching::get_application))
        .route(
            "/applications/:id/availability",
            get(email_inbound::list_availability),
        )
        .route("/interview/invite", post(interview::invite))
        .route("/interview/:id", get(interview::get_interview))
        .route("/interview/:id/complete", post(interview::complete))
        .route("/interview/:id/abandon", post(interview::abandon))
        .route("/score/:interview_id", get(scoring::get_score))
        .route("/score/:interview_id/finalize", post(scoring::finalize))
        .route("/tasks/process-resume", post(tasks::process_resume))
        .route("/tasks/compute-match", post(tasks::compute_match))
        .route("/tasks/active", get(tasks::active_tasks))
        .route("/tasks/stats", get(tasks::task_stats))
        .route(
            "/tasks/:id",
            get(tasks::get_task).delete(tasks::cancel_task),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_admin,
        ));

    let public_api = Router::new()
        .route("/interview/confirm", post(interview::confirm))
        .route("/interview/join/:token", get(interview::join))
        .route("/email/inbound", post(email_inbound::inbound))
        .layer(axum::middleware::from_fn_with_state(
            rate_limit::new_rps_state(config.public_rps, config.trust_proxy),
            rate_limit::rps_middleware,
        ));

    Router::new()
        .merge(base_routes)
        .merge(admin_api)
        .merge(public_api)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins))
        .with_state(state)
}
