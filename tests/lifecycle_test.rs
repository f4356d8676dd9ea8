mod common;

use chrono::Duration;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;

use common::TestApp;
use interview_backend::{
    database::Store,
    dto::score_dto::ScorePayload,
    error::Error,
    models::application::ApplicationStatus,
    models::interview::{InterviewArtifacts, InterviewStatus},
    models::interview_link::LinkStatus,
    models::score::Recommendation,
    models::task::{EmailTemplate, TaskKind},
    utils::time::Clock,
};

fn total(score: f64) -> ScorePayload {
    ScorePayload {
        total_score: Some(score),
        ..ScorePayload::default()
    }
}

async fn application_status(app: &TestApp, id: uuid::Uuid) -> ApplicationStatus {
    app.state.matching.get_application(id).await.unwrap().status
}

#[tokio::test]
async fn invite_confirm_join_complete_and_score() {
    let app = TestApp::new();
    let application = app.matched_application("ada@example.com").await;
    assert_eq!(application.status, ApplicationStatus::Matched);

    let invitation = app.state.lifecycle.invite(application.id).await.unwrap();
    assert_eq!(
        invitation.link.expires_at - app.clock.now(),
        Duration::hours(48)
    );
    assert!(invitation.invite_url.ends_with(&invitation.token));
    assert_eq!(application_status(&app, application.id).await, ApplicationStatus::Invited);

    app.clock.advance(Duration::hours(1));
    let slot = app.slot_tomorrow();
    let confirmation = app
        .state
        .lifecycle
        .confirm(&invitation.token, slot)
        .await
        .unwrap();
    assert_eq!(confirmation.interview.status, InterviewStatus::Scheduled);
    assert!(confirmation.message.contains("Backend Engineer"));
    assert_eq!(application_status(&app, application.id).await, ApplicationStatus::Confirmed);

    let again = app.state.lifecycle.confirm(&invitation.token, slot).await;
    assert!(matches!(again, Err(Error::TokenConsumed)));

    // Too early: the window opens 15 minutes before the slot.
    let early = app.state.lifecycle.join(&invitation.token).await;
    assert!(matches!(early, Err(Error::InvalidState(_))));
    assert_eq!(app.issuer.calls.load(Ordering::SeqCst), 0);

    app.clock.set(slot.start - Duration::minutes(5));
    let grant = app.state.lifecycle.join(&invitation.token).await.unwrap();
    assert!(!grant.reissued);
    assert_eq!(grant.interview.status, InterviewStatus::InProgress);
    assert_eq!(grant.credentials.session_id, grant.interview.session_id());
    assert_eq!(application_status(&app, application.id).await, ApplicationStatus::InProgress);

    let rejoin = app.state.lifecycle.join(&invitation.token).await.unwrap();
    assert!(rejoin.reissued);
    assert_ne!(rejoin.credentials.client_secret, grant.credentials.client_secret);

    let completed = app
        .state
        .lifecycle
        .complete(
            grant.interview.id,
            InterviewArtifacts {
                audio_url: Some("https://files.example.com/a.webm".into()),
                transcript_url: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(completed.status, InterviewStatus::Completed);
    assert_eq!(completed.audio_url.as_deref(), Some("https://files.example.com/a.webm"));

    let after_complete = app.state.lifecycle.join(&invitation.token).await;
    assert!(matches!(after_complete, Err(Error::TokenConsumed)));

    let first = app.state.lifecycle.finalize(completed.id, total(85.0)).await.unwrap();
    let second = app.state.lifecycle.finalize(completed.id, total(85.0)).await.unwrap();
    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.score, second.score);
    assert_eq!(first.score.total_score, 85.0);
    assert_eq!(first.score.recommendation, Recommendation::Select);
    assert_eq!(application_status(&app, application.id).await, ApplicationStatus::Scored);

    app.drain().await;
    assert_eq!(app.sink.count(EmailTemplate::Invite), 1);
    assert_eq!(app.sink.count(EmailTemplate::Confirmation), 1);
    assert_eq!(app.sink.count(EmailTemplate::ScoreRecorded), 1);
    let scored = app
        .sink
        .sent()
        .into_iter()
        .find(|e| e.template == EmailTemplate::ScoreRecorded)
        .unwrap();
    assert_eq!(scored.recipient, common::ADMIN_EMAIL);
    assert_eq!(scored.variables["total_score"], "85.0");

    let emails = app.store.list_emails(application.id).await.unwrap();
    assert_eq!(emails.len(), 3);
}

#[tokio::test]
async fn expired_token_always_rejects_confirmation() {
    let app = TestApp::new();
    let application = app.matched_application("late@example.com").await;
    let invitation = app.state.lifecycle.invite(application.id).await.unwrap();

    app.clock.advance(Duration::hours(49));
    let slot = app.slot_tomorrow();
    for _ in 0..3 {
        let result = app.state.lifecycle.confirm(&invitation.token, slot).await;
        assert!(matches!(result, Err(Error::TokenExpired)));
    }
    assert_eq!(application_status(&app, application.id).await, ApplicationStatus::Expired);

    let join = app.state.lifecycle.join(&invitation.token).await;
    assert!(matches!(join, Err(Error::TokenExpired)));
}

#[tokio::test]
async fn token_dies_at_exactly_its_expiry() {
    let app = TestApp::new();
    let application = app.matched_application("edge@example.com").await;
    let invitation = app.state.lifecycle.invite(application.id).await.unwrap();

    app.clock.set(invitation.link.expires_at);
    let slot = app.slot_tomorrow();
    let result = app.state.lifecycle.confirm(&invitation.token, slot).await;
    assert!(matches!(result, Err(Error::TokenExpired)));
}

#[tokio::test]
async fn expired_application_can_be_reinvited() {
    let app = TestApp::new();
    let application = app.matched_application("again@example.com").await;
    let first = app.state.lifecycle.invite(application.id).await.unwrap();

    app.clock.advance(Duration::hours(50));
    let report = app.state.lifecycle.sweep().await.unwrap();
    assert_eq!(report.expired_links, 1);
    assert_eq!(application_status(&app, application.id).await, ApplicationStatus::Expired);

    let second = app.state.lifecycle.invite(application.id).await.unwrap();
    assert_ne!(first.token, second.token);
    let slot = app.slot_tomorrow();
    app.state.lifecycle.confirm(&second.token, slot).await.unwrap();

    let old = app.state.lifecycle.confirm(&first.token, slot).await;
    assert!(matches!(old, Err(Error::TokenExpired)));
}

#[tokio::test]
async fn invite_requires_a_matched_application() {
    let app = TestApp::new();
    app.scorer.set_score(0.1);
    let rejected = app.matched_application("weak@example.com").await;
    assert_eq!(rejected.status, ApplicationStatus::Rejected);

    let result = app.state.lifecycle.invite(rejected.id).await;
    assert!(matches!(result, Err(Error::InvalidState(_))));
    assert!(app.store.tasks().unwrap().is_empty());
}

#[tokio::test]
async fn inverted_slot_is_a_validation_error() {
    let app = TestApp::new();
    let application = app.matched_application("slot@example.com").await;
    let invitation = app.state.lifecycle.invite(application.id).await.unwrap();

    let mut slot = app.slot_tomorrow();
    std::mem::swap(&mut slot.start, &mut slot.end);
    let result = app.state.lifecycle.confirm(&invitation.token, slot).await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));

    let link = app
        .store
        .get_link_by_token(&invitation.token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(link.status, LinkStatus::Issued);
}

#[tokio::test]
async fn concurrent_joins_consume_the_token_once() {
    let app = TestApp::new();
    let application = app.matched_application("race@example.com").await;
    let invitation = app.state.lifecycle.invite(application.id).await.unwrap();
    let slot = app.slot_tomorrow();
    app.state
        .lifecycle
        .confirm(&invitation.token, slot)
        .await
        .unwrap();
    app.clock.set(slot.start);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let lifecycle = app.state.lifecycle.clone();
            let token = invitation.token.clone();
            tokio::spawn(async move { lifecycle.join(&token).await })
        })
        .collect();

    let mut first_joins = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(grant) if !grant.reissued => first_joins += 1,
            Ok(_) | Err(Error::TokenConsumed) => {}
            Err(other) => panic!("unexpected join error: {other}"),
        }
    }
    assert_eq!(first_joins, 1);
    assert_eq!(application_status(&app, application.id).await, ApplicationStatus::InProgress);
}

#[tokio::test]
async fn concurrent_confirms_schedule_exactly_one_interview() {
    let app = TestApp::new();
    let application = app.matched_application("double-click@example.com").await;
    let invitation = app.state.lifecycle.invite(application.id).await.unwrap();

    let handles: Vec<_> = (0..8i64)
        .map(|i| {
            let lifecycle = app.state.lifecycle.clone();
            let token = invitation.token.clone();
            let mut slot = app.slot_tomorrow();
            slot.start += Duration::hours(i);
            slot.end += Duration::hours(i);
            tokio::spawn(async move { lifecycle.confirm(&token, slot).await })
        })
        .collect();

    let mut confirmed = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(confirmation) => confirmed.push(confirmation.interview),
            Err(Error::TokenConsumed) => {}
            Err(other) => panic!("unexpected confirm error: {other}"),
        }
    }
    assert_eq!(confirmed.len(), 1);
    assert_eq!(application_status(&app, application.id).await, ApplicationStatus::Confirmed);

    let link = app.store.get_link(invitation.link.id).await.unwrap().unwrap();
    assert_eq!(link.status, LinkStatus::Confirmed);
    let stored = app
        .store
        .get_interview_by_link(link.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.id, confirmed[0].id);

    app.drain().await;
    assert_eq!(app.sink.count(EmailTemplate::Confirmation), 1);
}

#[tokio::test]
async fn join_after_abandonment_reports_the_abandoned_interview() {
    let app = TestApp::new();
    let application = app.matched_application("gone@example.com").await;
    let invitation = app.state.lifecycle.invite(application.id).await.unwrap();
    let slot = app.slot_tomorrow();
    let confirmation = app
        .state
        .lifecycle
        .confirm(&invitation.token, slot)
        .await
        .unwrap();
    app.state
        .lifecycle
        .abandon(confirmation.interview.id)
        .await
        .unwrap();

    app.clock.set(slot.start);
    match app.state.lifecycle.join(&invitation.token).await {
        Err(Error::InvalidState(message)) => assert_eq!(message, "interview was abandoned"),
        other => panic!("expected an abandoned interview, got {other:?}"),
    }
    assert_eq!(app.issuer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn issuer_failure_leaves_token_unconsumed() {
    let app = TestApp::new();
    let application = app.matched_application("issuer@example.com").await;
    let invitation = app.state.lifecycle.invite(application.id).await.unwrap();
    let slot = app.slot_tomorrow();
    app.state
        .lifecycle
        .confirm(&invitation.token, slot)
        .await
        .unwrap();
    app.clock.set(slot.start);

    *app.issuer.failing.lock().unwrap() = true;
    let failed = app.state.lifecycle.join(&invitation.token).await;
    assert!(matches!(failed, Err(Error::UpstreamUnavailable(_))));
    assert_eq!(application_status(&app, application.id).await, ApplicationStatus::Confirmed);

    *app.issuer.failing.lock().unwrap() = false;
    let grant = app.state.lifecycle.join(&invitation.token).await.unwrap();
    assert!(!grant.reissued);
}

#[tokio::test]
async fn closed_window_abandons_the_interview() {
    let app = TestApp::new();
    let application = app.matched_application("noshow@example.com").await;
    let invitation = app.state.lifecycle.invite(application.id).await.unwrap();
    let slot = app.slot_tomorrow();
    let confirmation = app
        .state
        .lifecycle
        .confirm(&invitation.token, slot)
        .await
        .unwrap();

    app.clock.set(slot.end + Duration::minutes(31));
    let late = app.state.lifecycle.join(&invitation.token).await;
    assert!(matches!(late, Err(Error::InvalidState(_))));

    let interview = app
        .state
        .lifecycle
        .get_interview(confirmation.interview.id)
        .await
        .unwrap();
    assert_eq!(interview.status, InterviewStatus::Abandoned);
    assert_eq!(application_status(&app, application.id).await, ApplicationStatus::Abandoned);

    let score = app.state.lifecycle.finalize(interview.id, total(50.0)).await;
    assert!(matches!(score, Err(Error::InvalidState(_))));
}

#[tokio::test]
async fn sweep_abandons_stale_sessions() {
    let app = TestApp::new();
    let application = app.matched_application("stale@example.com").await;
    let invitation = app.state.lifecycle.invite(application.id).await.unwrap();
    let slot = app.slot_tomorrow();
    app.state
        .lifecycle
        .confirm(&invitation.token, slot)
        .await
        .unwrap();
    app.clock.set(slot.start);
    let grant = app.state.lifecycle.join(&invitation.token).await.unwrap();

    app.clock.set(slot.end + Duration::minutes(20));
    assert_eq!(app.state.lifecycle.sweep().await.unwrap().abandoned_interviews, 0);

    app.clock.set(slot.end + Duration::minutes(45));
    let report = app.state.lifecycle.sweep().await.unwrap();
    assert_eq!(report.abandoned_interviews, 1);
    let interview = app.state.lifecycle.get_interview(grant.interview.id).await.unwrap();
    assert_eq!(interview.status, InterviewStatus::Abandoned);
}

#[tokio::test]
async fn finalize_requires_a_completed_interview_and_a_score() {
    let app = TestApp::new();
    let application = app.matched_application("early@example.com").await;
    let invitation = app.state.lifecycle.invite(application.id).await.unwrap();
    let slot = app.slot_tomorrow();
    let confirmation = app
        .state
        .lifecycle
        .confirm(&invitation.token, slot)
        .await
        .unwrap();
    let id = confirmation.interview.id;

    let premature = app.state.lifecycle.finalize(id, total(70.0)).await;
    assert!(matches!(premature, Err(Error::InvalidState(_))));

    app.clock.set(slot.start);
    app.state.lifecycle.join(&invitation.token).await.unwrap();
    app.state
        .lifecycle
        .complete(id, InterviewArtifacts::default())
        .await
        .unwrap();

    let empty = app.state.lifecycle.finalize(id, ScorePayload::default()).await;
    assert!(matches!(empty, Err(Error::InvalidInput(_))));

    let rubric = BTreeMap::from([
        ("technical".to_string(), 70.0),
        ("communication".to_string(), 60.0),
    ]);
    let finalized = app
        .state
        .lifecycle
        .finalize(
            id,
            ScorePayload {
                rubric,
                ..ScorePayload::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(finalized.score.recommendation, Recommendation::Maybe);
    assert!((finalized.score.total_score - 65.45).abs() < 1e-9);
}

#[tokio::test]
async fn concurrent_finalize_writes_one_score_and_one_notification() {
    let app = TestApp::new();
    let application = app.matched_application("judges@example.com").await;
    let invitation = app.state.lifecycle.invite(application.id).await.unwrap();
    let slot = app.slot_tomorrow();
    let confirmation = app
        .state
        .lifecycle
        .confirm(&invitation.token, slot)
        .await
        .unwrap();
    let id = confirmation.interview.id;
    app.clock.set(slot.start);
    app.state.lifecycle.join(&invitation.token).await.unwrap();
    app.state
        .lifecycle
        .complete(id, InterviewArtifacts::default())
        .await
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let lifecycle = app.state.lifecycle.clone();
            tokio::spawn(async move { lifecycle.finalize(id, total(60.0 + i as f64)).await })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }
    assert_eq!(results.iter().filter(|r| r.created).count(), 1);
    let stored = app.store.get_score(id).await.unwrap().unwrap();
    assert!(results.iter().all(|r| r.score == stored));
    assert_eq!(application_status(&app, application.id).await, ApplicationStatus::Scored);

    let notifications = app
        .store
        .list_tasks(None, 100)
        .await
        .unwrap()
        .into_iter()
        .filter(|t| matches!(&t.kind.0, TaskKind::SendEmail(job) if job.template == EmailTemplate::ScoreRecorded))
        .count();
    assert_eq!(notifications, 1);
}
