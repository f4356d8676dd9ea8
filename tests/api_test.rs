mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
};
use chrono::{Duration, SecondsFormat};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;

use common::{test_config, TestApp, ADMIN_EMAIL, ADMIN_PASSWORD};
use interview_backend::{
    config::Config,
    database::Store,
    models::application::ApplicationStatus,
    utils::time::Clock,
};

async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<JsonValue>,
) -> (StatusCode, JsonValue) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.router().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null)
    };
    (status, json)
}

/// Posts a provider-style form to the inbound webhook.
async fn post_inbound(app: &TestApp, secret: Option<&str>, fields: &[(&str, &str)]) -> (StatusCode, JsonValue) {
    let uri = match secret {
        Some(secret) => format!("/email/inbound?secret={}", secret),
        None => "/email/inbound".to_string(),
    };
    let mut form = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in fields {
        form.append_pair(key, value);
    }
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.finish()))
        .unwrap();
    let response = app.router().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null))
}

fn inbound_app() -> TestApp {
    TestApp::with_config(Config {
        inbound_secret: Some("hook-secret".into()),
        ..test_config()
    })
}

async fn admin_token(app: &TestApp) -> String {
    app.state
        .identity
        .ensure_admin(ADMIN_EMAIL, ADMIN_PASSWORD)
        .await
        .unwrap();
    let (status, body) = send(
        app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({"email": ADMIN_EMAIL, "password": ADMIN_PASSWORD})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["access_token"].as_str().unwrap().to_string()
}

fn rfc3339(dt: chrono::DateTime<chrono::Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[tokio::test]
async fn health_reports_store_status() {
    let app = TestApp::new();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn admin_routes_require_a_live_session() {
    let app = TestApp::new();
    let (status, body) = send(&app, Method::GET, "/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "missing_authorization");

    let (status, _) = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({"email": ADMIN_EMAIL, "password": "wrong"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = admin_token(&app).await;
    let (status, body) = send(&app, Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], ADMIN_EMAIL);
    assert!(body.get("password_hash").is_none());

    app.clock.advance(Duration::minutes(31));
    let (status, _) = send(&app, Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn intake_validates_payloads() {
    let app = TestApp::new();
    let token = admin_token(&app).await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/intake/candidate",
        Some(&token),
        Some(json!({"name": "Ada", "email": "not-an-email"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "validation_error");

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/intake/job/{}", uuid::Uuid::new_v4()),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn full_interview_flow_over_http() {
    let app = TestApp::new();
    let token = admin_token(&app).await;

    let (status, candidate) = send(
        &app,
        Method::POST,
        "/intake/candidate",
        Some(&token),
        Some(json!({
            "name": "Grace Hopper",
            "email": "grace@example.com",
            "resume_text": "Compiler engineer with 10 years of experience in Rust and PostgreSQL, \
                            BSc Mathematics."
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{candidate}");
    assert!(candidate["parse_task_id"].is_null());

    let (status, job) = send(
        &app,
        Method::POST,
        "/intake/job",
        Some(&token),
        Some(json!({
            "title": "Staff Engineer",
            "description": "Own the scheduling core",
            "must_have": ["Rust"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{job}");

    let (status, application) = send(
        &app,
        Method::POST,
        "/match",
        Some(&token),
        Some(json!({"candidate_id": candidate["id"], "job_id": job["id"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{application}");
    assert_eq!(application["status"], "matched");

    let (status, invite) = send(
        &app,
        Method::POST,
        "/interview/invite",
        Some(&token),
        Some(json!({"application_id": application["id"]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{invite}");
    let invite_url = invite["invite_url"].as_str().unwrap();
    let interview_token = invite_url.split("token=").nth(1).unwrap().to_string();

    let start = app.clock.now() + Duration::hours(24);
    let slot = json!({
        "token": interview_token,
        "slot_start": rfc3339(start),
        "slot_end": rfc3339(start + Duration::hours(1)),
    });
    let (status, confirmed) =
        send(&app, Method::POST, "/interview/confirm", None, Some(slot.clone())).await;
    assert_eq!(status, StatusCode::OK, "{confirmed}");
    assert_eq!(confirmed["status"], "confirmed");
    let interview_id = confirmed["interview_id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, Method::POST, "/interview/confirm", None, Some(slot)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "token_consumed");

    let join_uri = format!("/interview/join/{}", interview_token);
    let (status, body) = send(&app, Method::GET, &join_uri, None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_state");

    app.clock.set(start);
    let (status, joined) = send(&app, Method::GET, &join_uri, None, None).await;
    assert_eq!(status, StatusCode::OK, "{joined}");
    assert_eq!(joined["reissued"], false);
    assert_eq!(joined["interview_id"], interview_id.as_str());
    assert!(joined["credentials"]["client_secret"].as_str().unwrap().len() >= 32);

    // The admin session outlived its TTL while the clock moved; log in again.
    let token = admin_token(&app).await;
    let (status, completed) = send(
        &app,
        Method::POST,
        &format!("/interview/{}/complete", interview_id),
        Some(&token),
        Some(json!({"transcript_url": "https://files.example.com/t.txt"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{completed}");
    assert_eq!(completed["status"], "completed");

    let finalize_uri = format!("/score/{}/finalize", interview_id);
    let payload = json!({"rubric": {"technical": 90.0, "communication": 80.0}, "summary": "Strong"});
    let (status, first) =
        send(&app, Method::POST, &finalize_uri, Some(&token), Some(payload.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "{first}");
    let (status, second) =
        send(&app, Method::POST, &finalize_uri, Some(&token), Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, second);
    assert_eq!(first["recommendation"], "select");

    let (status, stored) = send(
        &app,
        Method::GET,
        &format!("/score/{}", interview_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["id"], first["id"]);

    let (status, app_state) = send(
        &app,
        Method::GET,
        &format!("/applications/{}", application["id"].as_str().unwrap()),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app_state["status"], "scored");
}

#[tokio::test]
async fn expired_interview_token_is_gone() {
    let app = TestApp::new();
    let application = app.matched_application("gone@example.com").await;
    let invitation = app.state.lifecycle.invite(application.id).await.unwrap();

    app.clock.advance(Duration::hours(49));
    let start = app.clock.now() + Duration::hours(2);
    let (status, body) = send(
        &app,
        Method::POST,
        "/interview/confirm",
        None,
        Some(json!({
            "token": invitation.token,
            "slot_start": rfc3339(start),
            "slot_end": rfc3339(start + Duration::hours(1)),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["code"], "token_expired");
}

#[tokio::test]
async fn background_tasks_can_be_queued_inspected_and_cancelled() {
    let app = TestApp::new();
    let token = admin_token(&app).await;
    let application = app.matched_application("queue@example.com").await;

    let (status, queued) = send(
        &app,
        Method::POST,
        "/tasks/compute-match",
        Some(&token),
        Some(json!({
            "candidate_id": application.candidate_id,
            "job_id": application.job_id,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(queued["status"], "pending");
    let task_uri = format!("/tasks/{}", queued["task_id"].as_str().unwrap());

    let (status, task) = send(&app, Method::GET, &task_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["kind"]["type"], "compute_match");

    let (status, cancelled) = send(&app, Method::DELETE, &task_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (status, body) = send(&app, Method::DELETE, &task_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_state");

    let (status, _) = send(
        &app,
        Method::POST,
        "/tasks/process-resume",
        Some(&token),
        Some(json!({"candidate_id": application.candidate_id})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn emailed_availability_books_the_earliest_slot() {
    let app = inbound_app();
    let token = admin_token(&app).await;
    let application = app.matched_application("reply@example.com").await;
    app.state.lifecycle.invite(application.id).await.unwrap();

    let subject = format!("Re: Interview invitation [AppID:{}]", application.id);
    let (status, body) = post_inbound(
        &app,
        Some("hook-secret"),
        &[
            ("from", "reply@example.com"),
            ("subject", &subject),
            (
                "text",
                "Hi!\nI could do 2026-10-22 14:00-15:00, or Oct 21 at 2pm.\nThanks,\nAda\n> On Monday you wrote: 2026-10-20 09:00",
            ),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["slots_found"], 2);
    assert_eq!(body["auto_scheduled"], true);
    assert_eq!(body["reply"]["outcome"], "scheduled");
    assert_eq!(
        app.state.matching.get_application(application.id).await.unwrap().status,
        ApplicationStatus::Confirmed
    );

    let link = app.store.latest_link(application.id).await.unwrap().unwrap();
    let interview = app.store.get_interview_by_link(link.id).await.unwrap().unwrap();
    assert_eq!(rfc3339(interview.start_at), "2026-10-21T14:00:00Z");
    assert_eq!(rfc3339(interview.end_at), "2026-10-21T15:00:00Z");

    // A second reply cannot book again.
    let (status, body) = post_inbound(
        &app,
        Some("hook-secret"),
        &[("subject", &subject), ("text", "Actually 2026-10-23 10:00 works better")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["auto_scheduled"], false);
    assert_eq!(body["reply"]["outcome"], "token_consumed");

    let uri = format!("/applications/{}/availability", application.id);
    let (status, replies) = send(&app, Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replies.as_array().unwrap().len(), 2);

    app.drain().await;
    assert_eq!(app.sink.count(interview_backend::models::task::EmailTemplate::Confirmation), 1);
}

#[tokio::test]
async fn inbound_webhook_requires_the_shared_secret() {
    let unconfigured = TestApp::new();
    let (status, _) = post_inbound(&unconfigured, Some("anything"), &[("subject", "hi")]).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let app = inbound_app();
    let (status, body) = post_inbound(&app, None, &[("subject", "hi")]).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");
    let (status, _) = post_inbound(&app, Some("wrong"), &[("subject", "hi")]).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn inbound_replies_without_a_tag_or_a_time_are_not_booked() {
    let app = inbound_app();
    let application = app.matched_application("vague@example.com").await;
    app.state.lifecycle.invite(application.id).await.unwrap();

    let (status, body) = post_inbound(
        &app,
        Some("hook-secret"),
        &[("subject", "Re: Interview"), ("text", "2026-10-22 14:00")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["note"], "no application id found");
    assert_eq!(body["auto_scheduled"], false);

    let subject = format!("Re: [AppID:{}]", application.id);
    let (status, body) = post_inbound(
        &app,
        Some("hook-secret"),
        &[("subject", &subject), ("text", "Any afternoon next week suits me.")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["slots_found"], 0);
    assert_eq!(body["reply"]["outcome"], "no_slots");
    assert_eq!(
        app.state.matching.get_application(application.id).await.unwrap().status,
        ApplicationStatus::Invited
    );
}

#[tokio::test]
async fn dashboard_reports_counts_and_recent_activity() {
    let app = TestApp::new();
    let token = admin_token(&app).await;
    let application = app.matched_application("dash@example.com").await;
    let invitation = app.state.lifecycle.invite(application.id).await.unwrap();
    app.state
        .lifecycle
        .confirm(&invitation.token, app.slot_tomorrow())
        .await
        .unwrap();

    let (status, stats) = send(&app, Method::GET, "/dashboard/stats", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_jobs"], 1);
    assert_eq!(stats["total_candidates"], 1);
    assert_eq!(stats["total_applications"], 1);
    assert_eq!(stats["fit_applications"], 1);
    assert_eq!(stats["scheduled_interviews"], 1);
    assert_eq!(stats["scored_interviews"], 0);

    let (status, body) =
        send(&app, Method::GET, "/dashboard/recent-activity", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let activities = body["activities"].as_array().unwrap();
    let kinds: Vec<&str> = activities.iter().filter_map(|a| a["type"].as_str()).collect();
    assert!(kinds.contains(&"application"));
    assert!(kinds.contains(&"interview"));
    assert!(kinds.contains(&"candidate"));

    let (status, _) = send(&app, Method::GET, "/dashboard/stats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn active_tasks_and_stats_describe_the_queue() {
    let app = TestApp::new();
    let token = admin_token(&app).await;
    let application = app.matched_application("busy@example.com").await;
    app.state.lifecycle.invite(application.id).await.unwrap();

    let (status, body) = send(&app, Method::GET, "/tasks/stats", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let pending_emails = body["stats"]
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["task_type"] == "send_email" && b["status"] == "pending")
        .cloned()
        .unwrap();
    assert_eq!(pending_emails["count"], 1);

    let now = app.clock.now();
    app.store
        .claim_task(now, now + Duration::minutes(5))
        .await
        .unwrap()
        .unwrap();
    let (status, body) = send(&app, Method::GET, "/tasks/active?limit=5", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["tasks"][0]["status"], "running");
}

#[tokio::test]
async fn logout_and_admin_initialization() {
    let app = TestApp::new();
    let (status, body) = send(&app, Method::POST, "/auth/init-admin", None, None).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["email"], ADMIN_EMAIL);

    let (status, body) = send(&app, Method::POST, "/auth/init-admin", None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_state");

    let token = admin_token(&app).await;
    let (status, body) = send(&app, Method::POST, "/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Successfully logged out");

    let passwordless = TestApp::with_config(Config {
        admin_password: None,
        ..test_config()
    });
    let (status, _) = send(&passwordless, Method::POST, "/auth/init-admin", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
