//! In-memory gateway for tests and offline runs.
//!
//! Behaves like the exam service (attempt reuse, idempotent completion,
//! last-write-wins answers) and adds knobs to inject failures and latency.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use proctor_core::error::GatewayError;
use proctor_core::model::{
    AnswerValue, Attempt, AttemptStatus, Question, QuestionKind, SavedAnswer,
};
use proctor_core::traits::{
    AttemptEnvelope, CompletionResult, Gateway, SaveAck, SaveAnswerRequest, StartAttemptRequest,
};

/// A call the gateway received, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    StartAttempt {
        exam_id: String,
        student_id: String,
    },
    ResumeAttempt {
        attempt_id: String,
    },
    SaveAnswer {
        attempt_id: String,
        question_id: String,
        value: AnswerValue,
        version: u64,
    },
    CompleteAttempt {
        attempt_id: String,
    },
}

struct MockExam {
    questions: Vec<Question>,
    open: bool,
    time_limit_secs: Option<u64>,
}

struct MockAttempt {
    attempt: Attempt,
    answers: BTreeMap<String, SavedAnswer>,
    completion: Option<CompletionResult>,
}

impl MockAttempt {
    fn envelope(&self, questions: &[Question]) -> AttemptEnvelope {
        AttemptEnvelope {
            attempt: self.attempt.clone(),
            questions: questions.to_vec(),
            answers: self.answers.values().cloned().collect(),
        }
    }
}

#[derive(Default)]
struct MockState {
    exams: HashMap<String, MockExam>,
    attempts: HashMap<String, MockAttempt>,
    calls: Vec<GatewayCall>,
    failing_saves: u32,
    failing_completes: u32,
    complete_failure_status: u16,
    offline: bool,
    latency: Duration,
}

/// An exam service that lives in memory.
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
    saves_in_flight: AtomicUsize,
    peak_saves_in_flight: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`add_exam`](Self::add_exam) without a time limit.
    pub fn with_exam(self, exam_id: &str, questions: Vec<Question>) -> Self {
        self.add_exam(exam_id, questions, None);
        self
    }

    /// Register an open exam.
    pub fn add_exam(&self, exam_id: &str, questions: Vec<Question>, time_limit_secs: Option<u64>) {
        self.lock().exams.insert(
            exam_id.to_string(),
            MockExam {
                questions,
                open: true,
                time_limit_secs,
            },
        );
    }

    /// Stop accepting new attempts for an exam.
    pub fn close_exam(&self, exam_id: &str) {
        if let Some(exam) = self.lock().exams.get_mut(exam_id) {
            exam.open = false;
        }
    }

    /// Fail the next `n` answer saves with a 503.
    pub fn fail_next_saves(&self, n: u32) {
        self.lock().failing_saves = n;
    }

    /// Fail the next `n` completion calls with a 503.
    pub fn fail_next_completes(&self, n: u32) {
        self.reject_next_completes(n, 503);
    }

    /// Fail the next `n` completion calls with the given HTTP status.
    pub fn reject_next_completes(&self, n: u32, status: u16) {
        let mut state = self.lock();
        state.failing_completes = n;
        state.complete_failure_status = status;
    }

    /// Refuse every call with a network error while set.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Delay every call by `latency` (uses tokio time, so paused-clock tests
    /// advance through it).
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    pub fn save_calls(&self) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, GatewayCall::SaveAnswer { .. }))
            .collect()
    }

    pub fn complete_calls(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, GatewayCall::CompleteAttempt { .. }))
            .count()
    }

    /// The value stored remotely for a question.
    pub fn saved_answer(&self, attempt_id: &str, question_id: &str) -> Option<AnswerValue> {
        self.lock()
            .attempts
            .get(attempt_id)?
            .answers
            .get(question_id)
            .map(|a| a.value.clone())
    }

    pub fn attempt_status(&self, attempt_id: &str) -> Option<AttemptStatus> {
        self.lock().attempts.get(attempt_id).map(|a| a.attempt.status)
    }

    /// Forget an attempt, as if the service had purged it.
    pub fn remove_attempt(&self, attempt_id: &str) {
        self.lock().attempts.remove(attempt_id);
    }

    /// Highest number of saves that were ever running at the same time.
    pub fn peak_concurrent_saves(&self) -> usize {
        self.peak_saves_in_flight.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log the call, then apply latency and the offline switch.
    async fn receive(&self, call: GatewayCall) -> Result<(), GatewayError> {
        let latency = {
            let mut state = self.lock();
            state.calls.push(call);
            state.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.lock().offline {
            return Err(GatewayError::Network("gateway offline".into()));
        }
        Ok(())
    }
}

struct SaveSlot<'a>(&'a AtomicUsize);

impl<'a> SaveSlot<'a> {
    fn enter(current: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(current)
    }
}

impl Drop for SaveSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn injected_failure(what: &str, status: u16) -> GatewayError {
    GatewayError::Rejected {
        status,
        message: format!("injected {what} failure"),
    }
}

#[async_trait]
impl Gateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start_attempt(
        &self,
        request: &StartAttemptRequest,
    ) -> Result<AttemptEnvelope, GatewayError> {
        self.receive(GatewayCall::StartAttempt {
            exam_id: request.exam_id.clone(),
            student_id: request.student_id.clone(),
        })
        .await?;

        let mut state = self.lock();
        let (questions, time_limit_secs) = match state.exams.get(&request.exam_id) {
            Some(exam) if exam.open => (exam.questions.clone(), exam.time_limit_secs),
            _ => {
                return Err(GatewayError::NotFound(format!(
                    "exam {} is not open",
                    request.exam_id
                )))
            }
        };

        let existing = state.attempts.values().find(|a| {
            a.attempt.exam_id == request.exam_id && a.attempt.student_id == request.student_id
        });
        if let Some(existing) = existing {
            return match existing.attempt.status {
                AttemptStatus::InProgress => Ok(existing.envelope(&questions)),
                status => Err(GatewayError::Conflict(format!(
                    "attempt {} is {status:?}",
                    existing.attempt.id
                ))),
            };
        }

        let mut ordered = questions.clone();
        ordered.sort_by_key(|q| q.position);
        let attempt = Attempt {
            id: format!("att-{}", Uuid::new_v4().simple()),
            exam_id: request.exam_id.clone(),
            student_id: request.student_id.clone(),
            started_at: Utc::now(),
            status: AttemptStatus::InProgress,
            question_ids: ordered.into_iter().map(|q| q.id).collect(),
            time_limit_secs,
        };
        let record = MockAttempt {
            attempt,
            answers: BTreeMap::new(),
            completion: None,
        };
        let envelope = record.envelope(&questions);
        state.attempts.insert(record.attempt.id.clone(), record);
        Ok(envelope)
    }

    async fn resume_attempt(&self, attempt_id: &str) -> Result<AttemptEnvelope, GatewayError> {
        self.receive(GatewayCall::ResumeAttempt {
            attempt_id: attempt_id.to_string(),
        })
        .await?;

        let state = self.lock();
        let record = state
            .attempts
            .get(attempt_id)
            .ok_or_else(|| GatewayError::NotFound(format!("attempt {attempt_id}")))?;
        let questions = state
            .exams
            .get(&record.attempt.exam_id)
            .map(|e| e.questions.clone())
            .unwrap_or_default();
        Ok(record.envelope(&questions))
    }

    async fn save_answer(&self, request: &SaveAnswerRequest) -> Result<SaveAck, GatewayError> {
        let _slot = SaveSlot::enter(&self.saves_in_flight, &self.peak_saves_in_flight);
        self.receive(GatewayCall::SaveAnswer {
            attempt_id: request.attempt_id.clone(),
            question_id: request.question_id.clone(),
            value: request.value.clone(),
            version: request.version,
        })
        .await?;

        let mut state = self.lock();
        if state.failing_saves > 0 {
            state.failing_saves -= 1;
            return Err(injected_failure("save", 503));
        }
        let record = state
            .attempts
            .get_mut(&request.attempt_id)
            .ok_or_else(|| GatewayError::NotFound(format!("attempt {}", request.attempt_id)))?;
        if record.attempt.status != AttemptStatus::InProgress {
            return Err(GatewayError::Conflict(format!(
                "attempt {} no longer accepts answers",
                request.attempt_id
            )));
        }
        if !record.attempt.question_ids.contains(&request.question_id) {
            return Err(GatewayError::Rejected {
                status: 422,
                message: format!("unknown question {}", request.question_id),
            });
        }

        record.answers.insert(
            request.question_id.clone(),
            SavedAnswer {
                question_id: request.question_id.clone(),
                value: request.value.clone(),
                version: request.version,
            },
        );
        Ok(SaveAck {
            question_id: request.question_id.clone(),
            version: request.version,
            saved_at: Utc::now(),
        })
    }

    async fn complete_attempt(&self, attempt_id: &str) -> Result<CompletionResult, GatewayError> {
        self.receive(GatewayCall::CompleteAttempt {
            attempt_id: attempt_id.to_string(),
        })
        .await?;

        let mut state = self.lock();
        if state.failing_completes > 0 {
            state.failing_completes -= 1;
            return Err(injected_failure("complete", state.complete_failure_status));
        }
        let record = state
            .attempts
            .get_mut(attempt_id)
            .ok_or_else(|| GatewayError::NotFound(format!("attempt {attempt_id}")))?;
        if let Some(done) = &record.completion {
            return Ok(done.clone());
        }

        let completion = CompletionResult {
            attempt_id: attempt_id.to_string(),
            completed_at: Utc::now(),
            answered: record
                .answers
                .values()
                .filter(|a| !a.value.is_empty())
                .count(),
            total_questions: record.attempt.question_ids.len(),
        };
        record.attempt.status = AttemptStatus::Completed;
        record.completion = Some(completion.clone());
        Ok(completion)
    }
}

/// A small mixed-kind exam used by the CLI's mock gateway and by tests.
pub fn sample_questions() -> Vec<Question> {
    let q = |id: &str, kind: QuestionKind, position: u32, marks: f64, payload| Question {
        id: id.to_string(),
        kind,
        position,
        marks,
        payload,
    };
    vec![
        q(
            "capital",
            QuestionKind::SingleChoice,
            1,
            1.0,
            serde_json::json!({"prompt": "Capital of France?", "options": ["lyon", "paris", "nice"]}),
        ),
        q(
            "rivers",
            QuestionKind::MultipleChoice,
            2,
            2.0,
            serde_json::json!({"prompt": "Rivers of France", "options": ["seine", "loire", "danube"]}),
        ),
        q(
            "landlocked",
            QuestionKind::TrueFalse,
            3,
            1.0,
            serde_json::json!({"prompt": "France is landlocked."}),
        ),
        q(
            "population",
            QuestionKind::Numeric,
            4,
            1.0,
            serde_json::json!({"prompt": "Population in millions", "unit": "M"}),
        ),
        q(
            "regions",
            QuestionKind::Ordering,
            5,
            2.0,
            serde_json::json!({"prompt": "North to south", "items": ["centre", "north", "south"]}),
        ),
        q(
            "essay",
            QuestionKind::Essay,
            6,
            5.0,
            serde_json::json!({"prompt": "Describe the climate.", "max_words": 300}),
        ),
    ]
}
