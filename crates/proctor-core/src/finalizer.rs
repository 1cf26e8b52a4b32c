//! Submission finalizer.
//!
//! Finishing an attempt is three steps: wait out any in-flight autosave,
//! write whatever is still dirty, then complete the attempt remotely. Every
//! step is safe to repeat, so a failed submit can simply be run again.

use std::sync::Mutex;

use thiserror::Error;

use crate::autosave::{lock_store, write_batch, AutosaveScheduler};
use crate::error::GatewayError;
use crate::store::AnswerStore;
use crate::traits::{CompletionResult, Gateway};

/// Which finalization step failed.
#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("final flush failed: {0}")]
    Flush(GatewayError),
    #[error("completing attempt failed: {0}")]
    Complete(GatewayError),
}

impl FinalizeError {
    pub fn into_gateway_error(self) -> GatewayError {
        match self {
            FinalizeError::Flush(e) | FinalizeError::Complete(e) => e,
        }
    }
}

/// Drains pending writes and performs the terminal completion call.
pub struct SubmissionFinalizer<'a> {
    attempt_id: &'a str,
    gateway: &'a dyn Gateway,
    store: &'a Mutex<AnswerStore>,
    scheduler: &'a AutosaveScheduler,
}

impl<'a> SubmissionFinalizer<'a> {
    pub fn new(
        attempt_id: &'a str,
        gateway: &'a dyn Gateway,
        store: &'a Mutex<AnswerStore>,
        scheduler: &'a AutosaveScheduler,
    ) -> Self {
        Self {
            attempt_id,
            gateway,
            store,
            scheduler,
        }
    }

    pub async fn finalize(&self) -> Result<CompletionResult, FinalizeError> {
        // No autosave may start after this point; one already running is
        // allowed to finish so the final drain sees everything it put back.
        self.scheduler.suspend();
        self.scheduler.wait_idle().await;

        let batch = lock_store(self.store).drain_dirty();
        if !batch.is_empty() {
            tracing::debug!(
                attempt_id = %self.attempt_id,
                count = batch.len(),
                "final flush before completion"
            );
            match write_batch(self.gateway, self.attempt_id, self.store, batch).await {
                Ok(_) => self.scheduler.record_success(),
                Err(failure) => {
                    self.scheduler.record_failure(&failure.error);
                    return Err(FinalizeError::Flush(failure.error));
                }
            }
        }

        self.gateway
            .complete_attempt(self.attempt_id)
            .await
            .map_err(FinalizeError::Complete)
    }
}
