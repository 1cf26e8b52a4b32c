//! End-to-end session scenarios against the in-memory gateway.
//!
//! All tests run on a paused clock; sleeping advances time deterministically
//! and lets the autosave loop run its ticks.

use std::sync::Arc;
use std::time::Duration;

use proctor_core::autosave::{AutosaveConfig, FlushOutcome};
use proctor_core::error::{GatewayError, SessionError};
use proctor_core::model::{AnswerValue, AttemptStatus};
use proctor_core::session::{SessionConfig, SessionController, SessionState};
use proctor_gateway::mock::{sample_questions, GatewayCall, MockGateway};

const EXAM: &str = "geo-101";

fn config() -> SessionConfig {
    SessionConfig {
        autosave: AutosaveConfig {
            debounce: Duration::from_secs(3),
            max_interval: Duration::from_secs(30),
            tick: Duration::from_millis(250),
        },
        time_limit: None,
    }
}

fn gateway() -> Arc<MockGateway> {
    Arc::new(MockGateway::new().with_exam(EXAM, sample_questions()))
}

async fn started(gw: &Arc<MockGateway>) -> SessionController {
    let mut session = SessionController::new(gw.clone(), config());
    session.start(EXAM, "s-42").await.unwrap();
    assert_eq!(session.state(), SessionState::Active);
    session
}

fn attempt_id(session: &SessionController) -> String {
    session.attempt().unwrap().id.clone()
}

async fn sleep_secs(secs: f64) {
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}

fn saved_values(gw: &MockGateway) -> Vec<(String, AnswerValue)> {
    gw.save_calls()
        .into_iter()
        .filter_map(|call| match call {
            GatewayCall::SaveAnswer {
                question_id, value, ..
            } => Some((question_id, value)),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn edit_is_saved_once_after_quiet_period() {
    let gw = gateway();
    let mut session = started(&gw).await;

    session.set_answer("capital", "paris").unwrap();
    assert!(session.is_dirty("capital"));

    sleep_secs(2.0).await;
    assert!(gw.save_calls().is_empty());

    sleep_secs(2.0).await;
    assert_eq!(
        saved_values(&gw),
        [("capital".to_string(), AnswerValue::Choice("paris".into()))]
    );
    assert!(!session.is_dirty("capital"));

    sleep_secs(40.0).await;
    assert_eq!(gw.save_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn rapid_edits_coalesce_into_latest_value() {
    let gw = gateway();
    let mut session = started(&gw).await;

    session.set_answer("essay", "first draft").unwrap();
    sleep_secs(1.0).await;
    session.set_answer("essay", "second draft").unwrap();
    sleep_secs(1.0).await;
    session.set_answer("essay", "final draft").unwrap();

    sleep_secs(4.0).await;
    assert_eq!(
        saved_values(&gw),
        [("essay".to_string(), AnswerValue::Text("final draft".into()))]
    );
}

#[tokio::test(start_paused = true)]
async fn continuous_editing_still_saves_periodically() {
    let gw = gateway();
    let mut session = started(&gw).await;
    let id = attempt_id(&session);

    for i in 0..40 {
        session
            .set_answer("essay", format!("draft {i}").as_str())
            .unwrap();
        sleep_secs(1.0).await;
    }
    assert_eq!(gw.save_calls().len(), 1);
    assert!(matches!(
        gw.saved_answer(&id, "essay"),
        Some(AnswerValue::Text(t)) if t.starts_with("draft ")
    ));

    sleep_secs(5.0).await;
    assert_eq!(gw.save_calls().len(), 2);
    assert_eq!(
        gw.saved_answer(&id, "essay"),
        Some(AnswerValue::Text("draft 39".into()))
    );
}

#[tokio::test(start_paused = true)]
async fn submit_flushes_then_completes() {
    let gw = gateway();
    let mut session = started(&gw).await;
    let id = attempt_id(&session);

    session.set_answer("landlocked", "no").unwrap();
    let completion = session.submit().await.unwrap();

    assert_eq!(completion.attempt_id, id);
    assert_eq!(completion.answered, 1);
    assert_eq!(completion.total_questions, 6);
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(session.attempt().unwrap().status, AttemptStatus::Completed);

    let calls = gw.calls();
    assert_eq!(calls.len(), 3);
    assert!(matches!(calls[0], GatewayCall::StartAttempt { .. }));
    assert!(matches!(
        &calls[1],
        GatewayCall::SaveAnswer { question_id, value: AnswerValue::Boolean(false), .. }
            if question_id == "landlocked"
    ));
    assert!(matches!(calls[2], GatewayCall::CompleteAttempt { .. }));

    // Completed is terminal: the cached result comes back without a call.
    let again = session.submit().await.unwrap();
    assert_eq!(again, completion);
    assert_eq!(gw.complete_calls(), 1);
    assert!(matches!(
        session.set_answer("capital", "paris"),
        Err(SessionError::InvalidState {
            state: SessionState::Completed,
            ..
        })
    ));

    sleep_secs(60.0).await;
    assert_eq!(gw.save_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_completion_can_be_retried() {
    let gw = gateway();
    let mut session = started(&gw).await;

    session
        .set_answer("population", AnswerValue::Number(68.0))
        .unwrap();
    gw.fail_next_completes(1);

    let err = session.submit().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Submission(GatewayError::Rejected { status: 503, .. })
    ));
    assert!(err.is_retryable());
    assert_eq!(session.state(), SessionState::Finalizing);
    assert!(matches!(
        session.set_answer("capital", "paris"),
        Err(SessionError::InvalidState {
            state: SessionState::Finalizing,
            ..
        })
    ));

    let completion = session.submit().await.unwrap();
    assert_eq!(completion.answered, 1);
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(gw.save_calls().len(), 1);
    assert_eq!(gw.complete_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn rejected_completion_is_still_retryable() {
    let gw = gateway();
    let mut session = started(&gw).await;
    session.set_answer("capital", "paris").unwrap();
    gw.reject_next_completes(1, 400);

    let err = session.submit().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Submission(GatewayError::Rejected { status: 400, .. })
    ));
    assert!(err.is_retryable());
    assert_eq!(session.state(), SessionState::Finalizing);

    let completion = session.submit().await.unwrap();
    assert_eq!(completion.answered, 1);
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(gw.complete_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_final_flush_keeps_answer_for_retry() {
    let gw = gateway();
    let mut session = started(&gw).await;
    let id = attempt_id(&session);

    session.set_answer("capital", "nice").unwrap();
    gw.fail_next_saves(1);

    assert!(session.submit().await.is_err());
    assert_eq!(session.state(), SessionState::Finalizing);
    assert!(session.is_dirty("capital"));
    assert_eq!(gw.complete_calls(), 0);
    let status = session.sync_status().unwrap();
    assert!(status.degraded);
    assert_eq!(status.pending, 1);
    assert_eq!(status.consecutive_failures, 1);

    session.submit().await.unwrap();
    let status = session.sync_status().unwrap();
    assert!(!status.degraded);
    assert_eq!(status.consecutive_failures, 0);
    assert_eq!(
        gw.saved_answer(&id, "capital"),
        Some(AnswerValue::Choice("nice".into()))
    );
    assert_eq!(gw.attempt_status(&id), Some(AttemptStatus::Completed));
}

#[tokio::test(start_paused = true)]
async fn vanished_attempt_errors_the_session() {
    let gw = gateway();
    let mut session = started(&gw).await;
    gw.remove_attempt(&attempt_id(&session));

    session.set_answer("capital", "paris").unwrap();
    let err = session.submit().await.unwrap_err();
    assert!(matches!(err, SessionError::Submission(GatewayError::NotFound(_))));
    assert!(!err.is_retryable());
    assert_eq!(session.state(), SessionState::Errored);
}

#[tokio::test(start_paused = true)]
async fn only_one_flush_in_flight() {
    let gw = gateway();
    let mut session = started(&gw).await;
    gw.set_latency(Duration::from_millis(500));

    session.set_answer("capital", "paris").unwrap();
    session.set_answer("essay", "warm summers").unwrap();

    let (first, second) = tokio::join!(session.sync_now(), session.sync_now());
    assert_eq!(first.unwrap(), FlushOutcome::Flushed { written: 2 });
    assert_eq!(second.unwrap(), FlushOutcome::Skipped);
    assert_eq!(gw.peak_concurrent_saves(), 1);
    assert_eq!(gw.save_calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn edit_during_flight_is_saved_by_next_trigger() {
    let gw = gateway();
    let mut session = started(&gw).await;
    let id = attempt_id(&session);
    gw.set_latency(Duration::from_secs(1));

    session.set_answer("capital", "paris").unwrap();
    // Debounce fires at 3s; the write is in flight until 4s.
    sleep_secs(3.5).await;
    assert!(session.sync_status().unwrap().in_flight);
    session.set_answer("capital", "lyon").unwrap();

    sleep_secs(1.0).await;
    assert_eq!(gw.save_calls().len(), 1);
    assert!(session.is_dirty("capital"));

    sleep_secs(4.0).await;
    assert_eq!(
        saved_values(&gw),
        [
            ("capital".to_string(), AnswerValue::Choice("paris".into())),
            ("capital".to_string(), AnswerValue::Choice("lyon".into())),
        ]
    );
    assert_eq!(
        gw.saved_answer(&id, "capital"),
        Some(AnswerValue::Choice("lyon".into()))
    );
    assert!(!session.is_dirty("capital"));
    assert_eq!(gw.peak_concurrent_saves(), 1);
}

#[tokio::test(start_paused = true)]
async fn submit_waits_for_in_flight_autosave() {
    let gw = gateway();
    let mut session = started(&gw).await;
    let id = attempt_id(&session);
    gw.set_latency(Duration::from_secs(2));

    session.set_answer("capital", "paris").unwrap();
    // Debounce fires at 3s; the write is in flight until 5s.
    sleep_secs(3.5).await;
    assert!(session.sync_status().unwrap().in_flight);
    session.set_answer("capital", "lyon").unwrap();

    session.submit().await.unwrap();

    let calls = gw.calls();
    assert_eq!(calls.len(), 4);
    assert!(matches!(calls[0], GatewayCall::StartAttempt { .. }));
    assert!(matches!(
        &calls[1],
        GatewayCall::SaveAnswer { value: AnswerValue::Choice(v), .. } if v == "paris"
    ));
    assert!(matches!(
        &calls[2],
        GatewayCall::SaveAnswer { value: AnswerValue::Choice(v), .. } if v == "lyon"
    ));
    assert!(matches!(calls[3], GatewayCall::CompleteAttempt { .. }));
    assert_eq!(
        gw.saved_answer(&id, "capital"),
        Some(AnswerValue::Choice("lyon".into()))
    );
    assert_eq!(gw.peak_concurrent_saves(), 1);
}

#[tokio::test(start_paused = true)]
async fn autosave_failure_degrades_then_recovers() {
    let gw = gateway();
    let mut session = started(&gw).await;
    let id = attempt_id(&session);
    let mut sync = session.subscribe_sync().unwrap();

    gw.fail_next_saves(1);
    session
        .set_answer(
            "regions",
            AnswerValue::Sequence(vec!["north".into(), "centre".into(), "south".into()]),
        )
        .unwrap();

    sync.wait_for(|s| s.last_error.is_some()).await.unwrap();
    let status = session.sync_status().unwrap();
    assert!(status.degraded);
    assert_eq!(status.consecutive_failures, 1);
    assert_eq!(status.pending, 1);
    assert!(session.is_dirty("regions"));
    assert_eq!(gw.saved_answer(&id, "regions"), None);

    // No further edits: the periodic trigger retries.
    sleep_secs(31.0).await;
    let status = session.sync_status().unwrap();
    assert!(!status.degraded);
    assert_eq!(status.consecutive_failures, 0);
    assert_eq!(status.pending, 0);
    assert!(status.last_flush_at.is_some());
    assert_eq!(gw.save_calls().len(), 2);
    assert!(gw.saved_answer(&id, "regions").is_some());
}

#[tokio::test(start_paused = true)]
async fn resume_sees_only_flushed_answers() {
    let gw = gateway();
    let mut session = started(&gw).await;
    let id = attempt_id(&session);

    session.set_answer("capital", "paris").unwrap();
    sleep_secs(4.0).await;
    session.set_answer("rivers", AnswerValue::Choices(vec!["seine".into()])).unwrap();
    drop(session);

    sleep_secs(10.0).await;
    assert_eq!(gw.save_calls().len(), 1);

    let mut resumed = SessionController::new(gw.clone(), config());
    resumed.resume(&id).await.unwrap();
    assert_eq!(resumed.state(), SessionState::Active);
    assert_eq!(resumed.answer("capital"), Some(AnswerValue::Choice("paris".into())));
    assert_eq!(resumed.answer("rivers"), Some(AnswerValue::Empty));
    assert!(!resumed.is_dirty("capital"));

    // New edits keep versioning past what the gateway already holds.
    let version = resumed.set_answer("rivers", AnswerValue::Choice("loire".into())).unwrap();
    assert!(version > 1);
}

#[tokio::test(start_paused = true)]
async fn resume_of_completed_attempt_fails() {
    let gw = gateway();
    let mut session = started(&gw).await;
    let id = attempt_id(&session);
    session.submit().await.unwrap();

    let mut resumed = SessionController::new(gw.clone(), config());
    let err = resumed.resume(&id).await.unwrap_err();
    assert!(matches!(err, SessionError::AttemptCreation(GatewayError::Conflict(_))));
    assert_eq!(resumed.state(), SessionState::Errored);
}

#[tokio::test(start_paused = true)]
async fn closed_exam_cannot_start() {
    let gw = gateway();
    gw.close_exam(EXAM);
    let mut session = SessionController::new(gw.clone(), config());
    let err = session.start(EXAM, "s-42").await.unwrap_err();
    assert!(matches!(err, SessionError::AttemptCreation(GatewayError::NotFound(_))));
    assert_eq!(session.state(), SessionState::Errored);
}

#[tokio::test(start_paused = true)]
async fn invalid_edits_are_rejected_locally() {
    let gw = gateway();
    let mut session = started(&gw).await;

    assert!(matches!(
        session.set_answer("weather", "sunny"),
        Err(SessionError::UnknownQuestion(q)) if q == "weather"
    ));
    assert!(matches!(
        session.set_answer("landlocked", "perhaps"),
        Err(SessionError::InvalidAnswer { question_id, .. }) if question_id == "landlocked"
    ));
    assert!(matches!(
        session.navigate(6),
        Err(SessionError::NavigationRange { index: 6, len: 6 })
    ));

    sleep_secs(40.0).await;
    assert!(gw.save_calls().is_empty());
    assert_eq!(session.state(), SessionState::Active);
}

#[tokio::test(start_paused = true)]
async fn navigation_and_snapshot() {
    let gw = gateway();
    let mut session = started(&gw).await;

    assert_eq!(session.current_question().unwrap().id, "capital");
    session.set_answer("landlocked", "yes").unwrap();
    let question = session.navigate(2).unwrap();
    assert_eq!(question.id, "landlocked");
    assert_eq!(session.current_answer(), Some(AnswerValue::Boolean(true)));

    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, SessionState::Active);
    assert_eq!(snapshot.current_index, Some(2));
    assert_eq!(snapshot.current_question_id.as_deref(), Some("landlocked"));
    assert_eq!(snapshot.answered, 1);
    assert_eq!(snapshot.total_questions, 6);
    assert_eq!(snapshot.sync.unwrap().pending, 1);

    // Navigation alone never syncs.
    assert!(gw.save_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn abandon_stops_everything_locally() {
    let gw = gateway();
    let mut session = started(&gw).await;
    let id = attempt_id(&session);

    session.set_answer("capital", "paris").unwrap();
    session.abandon().unwrap();
    assert_eq!(session.state(), SessionState::Abandoned);
    assert_eq!(session.attempt().unwrap().status, AttemptStatus::Abandoned);

    sleep_secs(60.0).await;
    assert!(gw.save_calls().is_empty());
    assert_eq!(gw.complete_calls(), 0);
    assert_eq!(gw.attempt_status(&id), Some(AttemptStatus::InProgress));
    assert!(session.set_answer("capital", "lyon").is_err());
    assert!(session.submit().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn time_limit_is_advisory() {
    let gw = gateway();
    gw.add_exam("timed", sample_questions(), Some(60));
    let mut session = SessionController::new(gw.clone(), config());
    session.start("timed", "s-42").await.unwrap();
    assert_eq!(session.remaining(), Some(Duration::from_secs(60)));

    sleep_secs(45.0).await;
    assert_eq!(session.remaining(), Some(Duration::from_secs(15)));
    assert!(!session.is_expired());

    sleep_secs(20.0).await;
    assert!(session.is_expired());
    assert_eq!(session.state(), SessionState::Active);

    session.submit().await.unwrap();
    assert_eq!(session.elapsed(), Duration::from_secs(65));
}
