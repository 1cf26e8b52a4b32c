//! The remote gateway trait and its request/response types.
//!
//! The session engine consumes the gateway; `proctor-gateway` implements it
//! over HTTP and in memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::model::{AnswerValue, Attempt, Question, SavedAnswer};

/// Exam, answer, and submission endpoints of the remote record.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Human-readable gateway name (e.g. "http").
    fn name(&self) -> &str;

    /// Create (or return the open) attempt for a student on an exam.
    async fn start_attempt(
        &self,
        request: &StartAttemptRequest,
    ) -> Result<AttemptEnvelope, GatewayError>;

    /// Re-fetch an existing attempt with every answer saved so far.
    async fn resume_attempt(&self, attempt_id: &str) -> Result<AttemptEnvelope, GatewayError>;

    /// Persist one answer. Repeating a call with the same value is harmless.
    async fn save_answer(&self, request: &SaveAnswerRequest) -> Result<SaveAck, GatewayError>;

    /// Complete the attempt. Repeat calls return the original result.
    async fn complete_attempt(&self, attempt_id: &str) -> Result<CompletionResult, GatewayError>;
}

/// Request to start an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartAttemptRequest {
    pub exam_id: String,
    pub student_id: String,
}

/// An attempt together with its question set and saved answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptEnvelope {
    pub attempt: Attempt,
    pub questions: Vec<Question>,
    /// Answers already stored remotely (empty for a fresh attempt).
    #[serde(default)]
    pub answers: Vec<SavedAnswer>,
}

/// Request to persist one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveAnswerRequest {
    pub attempt_id: String,
    pub question_id: String,
    pub value: AnswerValue,
    /// Local edit counter at the time of the edit; diagnostic only.
    pub version: u64,
}

/// Acknowledgement of a saved answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveAck {
    pub question_id: String,
    pub version: u64,
    pub saved_at: DateTime<Utc>,
}

/// Outcome of completing an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    pub attempt_id: String,
    pub completed_at: DateTime<Utc>,
    /// Number of questions with a stored, non-empty answer.
    pub answered: usize,
    pub total_questions: usize,
}
