//! Session controller: the state machine a UI drives while a student takes
//! an exam.
//!
//! One controller exists per attempt and is passed around explicitly. It owns
//! the answer store, the timer, and the autosave scheduler, and delegates
//! submission to the [`SubmissionFinalizer`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::autosave::{
    lock_store, AutosaveConfig, AutosaveScheduler, FlushOutcome, SharedStore, SyncState,
    SyncStatus,
};
use crate::error::{GatewayError, SessionError};
use crate::finalizer::SubmissionFinalizer;
use crate::kinds;
use crate::model::{AnswerValue, Attempt, AttemptStatus, Question, QuestionKind};
use crate::store::AnswerStore;
use crate::timer::SessionTimer;
use crate::traits::{AttemptEnvelope, CompletionResult, Gateway, StartAttemptRequest};

/// Lifecycle of a session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Initializing,
    Active,
    Finalizing,
    Completed,
    Errored,
    Abandoned,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Initializing => "initializing",
            SessionState::Active => "active",
            SessionState::Finalizing => "finalizing",
            SessionState::Completed => "completed",
            SessionState::Errored => "errored",
            SessionState::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}

/// Configuration for a session controller.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub autosave: AutosaveConfig,
    /// Overrides the attempt's own time limit when set.
    pub time_limit: Option<Duration>,
}

/// Everything the UI needs to render the session at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub attempt_id: Option<String>,
    pub current_index: Option<usize>,
    pub current_question_id: Option<String>,
    pub current_kind: Option<QuestionKind>,
    pub current_answer: Option<AnswerValue>,
    pub answered: usize,
    pub total_questions: usize,
    pub elapsed_secs: u64,
    pub remaining_secs: Option<u64>,
    pub sync: Option<SyncStatus>,
}

struct LiveAttempt {
    attempt: Attempt,
    questions: Vec<Question>,
    positions: HashMap<String, usize>,
    store: SharedStore,
    scheduler: Arc<AutosaveScheduler>,
    autosave_task: Option<JoinHandle<()>>,
    timer: SessionTimer,
    current: usize,
}

impl LiveAttempt {
    fn stop_autosave(&mut self) {
        self.scheduler.suspend();
        if let Some(task) = self.autosave_task.take() {
            task.abort();
        }
    }
}

impl Drop for LiveAttempt {
    fn drop(&mut self) {
        if let Some(task) = self.autosave_task.take() {
            task.abort();
        }
    }
}

/// The top-level exam session state machine.
pub struct SessionController {
    gateway: Arc<dyn Gateway>,
    config: SessionConfig,
    state: SessionState,
    live: Option<LiveAttempt>,
    completion: Option<CompletionResult>,
}

impl SessionController {
    /// Create a controller in `Initializing`. Nothing is fetched until
    /// [`start`](Self::start) or [`resume`](Self::resume).
    pub fn new(gateway: Arc<dyn Gateway>, config: SessionConfig) -> Self {
        Self {
            gateway,
            config,
            state: SessionState::Initializing,
            live: None,
            completion: None,
        }
    }

    /// Create the attempt and enter `Active`.
    ///
    /// Any gateway failure moves the controller to `Errored`; it is not
    /// retried here.
    pub async fn start(&mut self, exam_id: &str, student_id: &str) -> Result<(), SessionError> {
        self.require(SessionState::Initializing, "start")?;
        let request = StartAttemptRequest {
            exam_id: exam_id.to_string(),
            student_id: student_id.to_string(),
        };
        let envelope = match self.gateway.start_attempt(&request).await {
            Ok(envelope) => envelope,
            Err(e) => return Err(self.fail_initializing(e)),
        };
        self.activate(envelope, false)
    }

    /// Re-open an in-progress attempt, seeding the store with the answers
    /// the gateway already holds. Edits that were never flushed are gone.
    pub async fn resume(&mut self, attempt_id: &str) -> Result<(), SessionError> {
        self.require(SessionState::Initializing, "resume")?;
        let envelope = match self.gateway.resume_attempt(attempt_id).await {
            Ok(envelope) => envelope,
            Err(e) => return Err(self.fail_initializing(e)),
        };
        if envelope.attempt.status != AttemptStatus::InProgress {
            return Err(self.fail_initializing(GatewayError::Conflict(format!(
                "attempt {attempt_id} is no longer in progress"
            ))));
        }
        self.activate(envelope, true)
    }

    fn fail_initializing(&mut self, error: GatewayError) -> SessionError {
        tracing::error!(error = %error, "attempt initialization failed");
        self.state = SessionState::Errored;
        SessionError::AttemptCreation(error)
    }

    fn activate(&mut self, envelope: AttemptEnvelope, resumed: bool) -> Result<(), SessionError> {
        let AttemptEnvelope {
            attempt,
            questions,
            answers,
        } = envelope;

        let questions = match order_questions(&attempt, questions) {
            Ok(questions) => questions,
            Err(e) => return Err(self.fail_initializing(e)),
        };
        let positions = questions
            .iter()
            .enumerate()
            .map(|(i, q)| (q.id.clone(), i))
            .collect();

        let mut store = AnswerStore::new(questions.iter().map(|q| q.id.clone()));
        store.load_saved(&answers);
        let store: SharedStore = Arc::new(Mutex::new(store));

        let scheduler = Arc::new(AutosaveScheduler::new(
            attempt.id.clone(),
            Arc::clone(&self.gateway),
            Arc::clone(&store),
            self.config.autosave,
        ));
        let autosave_task = tokio::spawn(Arc::clone(&scheduler).run());

        let limit = self
            .config
            .time_limit
            .or(attempt.time_limit_secs.map(Duration::from_secs));
        let mut timer = if resumed {
            let already = (chrono::Utc::now() - attempt.started_at)
                .to_std()
                .unwrap_or_default();
            SessionTimer::with_elapsed(limit, already)
        } else {
            SessionTimer::new(limit)
        };
        timer.start();

        tracing::info!(
            attempt_id = %attempt.id,
            exam_id = %attempt.exam_id,
            questions = questions.len(),
            resumed,
            "session active"
        );

        self.live = Some(LiveAttempt {
            attempt,
            questions,
            positions,
            store,
            scheduler,
            autosave_task: Some(autosave_task),
            timer,
            current: 0,
        });
        self.state = SessionState::Active;
        Ok(())
    }

    fn require(&self, expected: SessionState, operation: &'static str) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn active(&self, operation: &'static str) -> Result<&LiveAttempt, SessionError> {
        match (self.state, self.live.as_ref()) {
            (SessionState::Active, Some(live)) => Ok(live),
            (state, _) => Err(SessionError::InvalidState { operation, state }),
        }
    }

    fn active_mut(&mut self, operation: &'static str) -> Result<&mut LiveAttempt, SessionError> {
        match (self.state, self.live.as_mut()) {
            (SessionState::Active, Some(live)) => Ok(live),
            (state, _) => Err(SessionError::InvalidState { operation, state }),
        }
    }

    /// Record an answer locally and mark it for autosave.
    ///
    /// Never touches the network. Returns the edit's version.
    pub fn set_answer(
        &mut self,
        question_id: &str,
        value: impl Into<AnswerValue>,
    ) -> Result<u64, SessionError> {
        let live = self.active_mut("set answer")?;
        let position = *live
            .positions
            .get(question_id)
            .ok_or_else(|| SessionError::UnknownQuestion(question_id.to_string()))?;
        let kind = live.questions[position].kind;
        let value =
            kinds::normalize(kind, value.into()).map_err(|reason| SessionError::InvalidAnswer {
                question_id: question_id.to_string(),
                reason,
            })?;

        let version = lock_store(&live.store)
            .set(question_id, value)
            .ok_or_else(|| SessionError::UnknownQuestion(question_id.to_string()))?;
        live.scheduler.note_edit();
        Ok(version)
    }

    /// Move to the question at `index`. Has no sync side effect.
    pub fn navigate(&mut self, index: usize) -> Result<&Question, SessionError> {
        let live = self.active_mut("navigate")?;
        let len = live.questions.len();
        if index >= len {
            return Err(SessionError::NavigationRange { index, len });
        }
        live.current = index;
        Ok(&live.questions[index])
    }

    /// Flush dirty answers now, subject to the same in-flight rule as the
    /// background triggers. Failures are reported in the outcome and in the
    /// sync status, never as an error.
    pub async fn sync_now(&self) -> Result<FlushOutcome, SessionError> {
        let live = self.active("sync")?;
        Ok(live.scheduler.flush().await)
    }

    /// Submit the attempt.
    ///
    /// From `Active` this enters `Finalizing` and runs the finalizer. On
    /// failure the session stays in `Finalizing` and `submit` can be called
    /// again; the one exception is an attempt the gateway no longer knows,
    /// which moves to `Errored`. Once `Completed`, the original result is
    /// returned without contacting the gateway.
    pub async fn submit(&mut self) -> Result<CompletionResult, SessionError> {
        if self.state == SessionState::Completed {
            if let Some(completion) = &self.completion {
                return Ok(completion.clone());
            }
        }
        let state = self.state;
        let live = match (state, self.live.as_mut()) {
            (SessionState::Active | SessionState::Finalizing, Some(live)) => live,
            (state, _) => {
                return Err(SessionError::InvalidState {
                    operation: "submit",
                    state,
                })
            }
        };

        if state == SessionState::Active {
            live.timer.stop();
            self.state = SessionState::Finalizing;
            tracing::info!(attempt_id = %live.attempt.id, "finalizing attempt");
        }

        let finalizer = SubmissionFinalizer::new(
            &live.attempt.id,
            self.gateway.as_ref(),
            &live.store,
            &live.scheduler,
        );
        let outcome = finalizer.finalize().await;
        match outcome {
            Ok(completion) => {
                live.stop_autosave();
                lock_store(&live.store).clear();
                live.attempt.status = AttemptStatus::Completed;
                tracing::info!(
                    attempt_id = %live.attempt.id,
                    answered = completion.answered,
                    "attempt completed"
                );
                self.state = SessionState::Completed;
                self.completion = Some(completion.clone());
                Ok(completion)
            }
            Err(e) => {
                let error = e.into_gateway_error();
                if matches!(error, GatewayError::NotFound(_)) {
                    tracing::error!(attempt_id = %live.attempt.id, error = %error, "attempt vanished during submit");
                    live.stop_autosave();
                    self.state = SessionState::Errored;
                } else {
                    tracing::warn!(attempt_id = %live.attempt.id, error = %error, "submit failed, retry allowed");
                }
                Err(SessionError::Submission(error))
            }
        }
    }

    /// Give up on the attempt locally: stop autosave and the timer and drop
    /// every answer. Nothing is sent to the gateway.
    pub fn abandon(&mut self) -> Result<(), SessionError> {
        let live = self.active_mut("abandon")?;
        live.stop_autosave();
        live.timer.stop();
        lock_store(&live.store).clear();
        live.attempt.status = AttemptStatus::Abandoned;
        tracing::info!(attempt_id = %live.attempt.id, "attempt abandoned");
        self.state = SessionState::Abandoned;
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn attempt(&self) -> Option<&Attempt> {
        self.live.as_ref().map(|l| &l.attempt)
    }

    /// Questions in presentation order.
    pub fn questions(&self) -> &[Question] {
        self.live.as_ref().map(|l| l.questions.as_slice()).unwrap_or_default()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.live.as_ref().map(|l| l.current)
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.live.as_ref().and_then(|l| l.questions.get(l.current))
    }

    /// Current local value for a question, whether or not it is saved yet.
    pub fn answer(&self, question_id: &str) -> Option<AnswerValue> {
        let live = self.live.as_ref()?;
        lock_store(&live.store).get(question_id).cloned()
    }

    pub fn current_answer(&self) -> Option<AnswerValue> {
        let question = self.current_question()?;
        self.answer(&question.id)
    }

    /// Whether a question has edits not yet handed to a flush.
    pub fn is_dirty(&self, question_id: &str) -> bool {
        self.live
            .as_ref()
            .is_some_and(|l| lock_store(&l.store).is_dirty(question_id))
    }

    pub fn elapsed(&self) -> Duration {
        self.live.as_ref().map(|l| l.timer.elapsed()).unwrap_or_default()
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.live.as_ref().and_then(|l| l.timer.remaining())
    }

    /// The time limit has run out. Advisory; the caller decides to submit.
    pub fn is_expired(&self) -> bool {
        self.live.as_ref().is_some_and(|l| l.timer.is_expired())
    }

    pub fn sync_status(&self) -> Option<SyncStatus> {
        self.live.as_ref().map(|l| l.scheduler.status())
    }

    /// Live feed of sync state for a degraded-sync indicator.
    pub fn subscribe_sync(&self) -> Option<watch::Receiver<SyncState>> {
        self.live.as_ref().map(|l| l.scheduler.subscribe())
    }

    pub fn completion(&self) -> Option<&CompletionResult> {
        self.completion.as_ref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let current = self.current_question();
        let answered = self
            .live
            .as_ref()
            .map(|l| lock_store(&l.store).answered_count())
            .unwrap_or_default();
        SessionSnapshot {
            state: self.state,
            attempt_id: self.attempt().map(|a| a.id.clone()),
            current_index: self.current_index(),
            current_question_id: current.map(|q| q.id.clone()),
            current_kind: current.map(|q| q.kind),
            current_answer: self.current_answer(),
            answered,
            total_questions: self.questions().len(),
            elapsed_secs: self.elapsed().as_secs(),
            remaining_secs: self.remaining().map(|r| r.as_secs()),
            sync: self.sync_status(),
        }
    }
}

/// Arrange questions in the attempt's order. Falls back to `position` when
/// the attempt carries no explicit order.
fn order_questions(
    attempt: &Attempt,
    mut questions: Vec<Question>,
) -> Result<Vec<Question>, GatewayError> {
    if attempt.question_ids.is_empty() {
        questions.sort_by_key(|q| q.position);
        return Ok(questions);
    }

    let mut by_id: HashMap<String, Question> =
        questions.into_iter().map(|q| (q.id.clone(), q)).collect();
    attempt
        .question_ids
        .iter()
        .map(|id| {
            by_id.remove(id).ok_or_else(|| {
                GatewayError::Decode(format!("attempt lists question {id} but it was not sent"))
            })
        })
        .collect()
}
