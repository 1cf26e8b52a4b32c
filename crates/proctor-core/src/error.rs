//! Error types for the session engine.
//!
//! `GatewayError` describes failures at the remote boundary. It is defined
//! here so the scheduler and finalizer can classify failures without string
//! matching. `SessionError` is the taxonomy surfaced by the controller's
//! public operations; raw gateway errors never escape it unwrapped.

use thiserror::Error;

use crate::session::SessionState;

/// Errors that can occur when talking to the remote exam gateway.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    /// The exam or attempt does not exist (or is not open to this student).
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with the remote record (e.g. already completed).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The gateway returned an error response.
    #[error("gateway rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Returns `true` if retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Timeout(_) | GatewayError::Network(_) => true,
            GatewayError::Rejected { status, .. } => *status >= 500 || *status == 429,
            GatewayError::NotFound(_) | GatewayError::Conflict(_) | GatewayError::Decode(_) => {
                false
            }
        }
    }
}

/// Errors surfaced by the session controller.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The gateway refused to create or resume the attempt. Fatal for this
    /// controller; the caller must construct a new one to retry.
    #[error("could not create attempt: {0}")]
    AttemptCreation(#[source] GatewayError),

    /// The question id is not part of this attempt.
    #[error("unknown question: {0}")]
    UnknownQuestion(String),

    /// Navigation target outside `0..len`.
    #[error("question index {index} out of range (attempt has {len} questions)")]
    NavigationRange { index: usize, len: usize },

    /// The value does not fit the question kind's answer shape.
    #[error("invalid answer for question {question_id}: {reason}")]
    InvalidAnswer { question_id: String, reason: String },

    /// The operation is not allowed in the controller's current state.
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// Submitting failed. The session stays in `Finalizing` and `submit()`
    /// may be called again.
    #[error("submission failed: {0}")]
    Submission(#[source] GatewayError),
}

impl SessionError {
    /// Returns `true` if the same operation may be retried on this session.
    ///
    /// Every failed submit leaves the session in `Finalizing` except one for
    /// an attempt the gateway no longer knows.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Submission(e) if !matches!(e, GatewayError::NotFound(_)))
    }
}
