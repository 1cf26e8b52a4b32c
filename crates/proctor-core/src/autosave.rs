//! Autosave scheduler.
//!
//! Flushes dirty answers to the gateway on two triggers evaluated by a single
//! tick loop: a debounce deadline pushed back by every edit, and a periodic
//! deadline that bounds how long an edit can stay unsaved. Whichever fires
//! first re-arms both. At most one flush is ever in flight; a trigger that
//! finds one running is dropped and the dirty set waits for the next one.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::GatewayError;
use crate::store::{AnswerStore, PendingWrite};
use crate::traits::{Gateway, SaveAnswerRequest};

/// Answer store shared between the controller, scheduler, and finalizer.
pub type SharedStore = Arc<Mutex<AnswerStore>>;

/// Lock the store. The store holds no invariants a panicking writer could
/// break halfway, so a poisoned lock is recovered.
pub(crate) fn lock_store(store: &Mutex<AnswerStore>) -> MutexGuard<'_, AnswerStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Timing configuration for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveConfig {
    /// Quiet period after the last edit before flushing.
    pub debounce: Duration,
    /// Longest time between flushes while edits keep arriving.
    pub max_interval: Duration,
    /// How often the loop checks its deadlines.
    pub tick: Duration,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(3),
            max_interval: Duration::from_secs(30),
            tick: Duration::from_millis(250),
        }
    }
}

/// Sync bookkeeping for one attempt. Only the scheduler writes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncState {
    pub in_flight: bool,
    /// Set once finalization begins; no new flushes start afterwards.
    pub suspended: bool,
    pub last_flush_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub flush_count: u64,
}

/// Read-only view of sync health for the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    /// The most recent flush failed; answers are being retried.
    pub degraded: bool,
    pub in_flight: bool,
    /// Answers edited locally and not yet handed to a flush.
    pub pending: usize,
    pub last_flush_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

/// What a flush attempt did.
#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    /// No trigger was due.
    NotDue,
    /// Another flush was in flight, or autosave is suspended.
    Skipped,
    /// Nothing was dirty.
    Clean,
    /// Every drained answer was written.
    Flushed { written: usize },
    /// A write failed; unwritten answers were marked dirty again.
    Failed {
        written: usize,
        restored: usize,
        error: GatewayError,
    },
}

#[derive(Debug)]
struct Deadlines {
    debounce_at: Option<Instant>,
    periodic_at: Instant,
}

/// Persists dirty answers without blocking edits and without overlapping
/// writes.
pub struct AutosaveScheduler {
    attempt_id: String,
    gateway: Arc<dyn Gateway>,
    store: SharedStore,
    config: AutosaveConfig,
    state: watch::Sender<SyncState>,
    deadlines: Mutex<Deadlines>,
}

impl AutosaveScheduler {
    pub fn new(
        attempt_id: impl Into<String>,
        gateway: Arc<dyn Gateway>,
        store: SharedStore,
        config: AutosaveConfig,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            attempt_id: attempt_id.into(),
            gateway,
            store,
            config,
            state,
            deadlines: Mutex::new(Deadlines {
                debounce_at: None,
                periodic_at: Instant::now() + config.max_interval,
            }),
        }
    }

    pub fn config(&self) -> &AutosaveConfig {
        &self.config
    }

    fn deadlines(&self) -> MutexGuard<'_, Deadlines> {
        self.deadlines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Restart the debounce wait. Called after every edit; never suspends.
    pub fn note_edit(&self) {
        self.deadlines().debounce_at = Some(Instant::now() + self.config.debounce);
    }

    /// Check both deadlines and flush if either has passed.
    pub async fn tick(&self) -> FlushOutcome {
        let now = Instant::now();
        {
            let mut deadlines = self.deadlines();
            let debounce_due = deadlines.debounce_at.is_some_and(|at| now >= at);
            let periodic_due = now >= deadlines.periodic_at;
            if !debounce_due && !periodic_due {
                return FlushOutcome::NotDue;
            }
            deadlines.debounce_at = None;
            deadlines.periodic_at = now + self.config.max_interval;
        }
        self.flush().await
    }

    /// Flush now unless another flush is in flight or autosave is suspended.
    pub async fn flush(&self) -> FlushOutcome {
        let acquired = self.state.send_if_modified(|s| {
            if s.in_flight || s.suspended {
                false
            } else {
                s.in_flight = true;
                true
            }
        });
        if !acquired {
            tracing::trace!(attempt_id = %self.attempt_id, "flush skipped");
            return FlushOutcome::Skipped;
        }
        let _in_flight = InFlightGuard { state: &self.state };

        let batch = lock_store(&self.store).drain_dirty();
        if batch.is_empty() {
            return FlushOutcome::Clean;
        }

        tracing::debug!(
            attempt_id = %self.attempt_id,
            count = batch.len(),
            "autosaving answers"
        );
        match write_batch(self.gateway.as_ref(), &self.attempt_id, &self.store, batch).await {
            Ok(written) => {
                self.record_success();
                FlushOutcome::Flushed { written }
            }
            Err(failure) => {
                tracing::warn!(
                    attempt_id = %self.attempt_id,
                    error = %failure.error,
                    restored = failure.restored,
                    "autosave failed, answers kept dirty for retry"
                );
                self.record_failure(&failure.error);
                FlushOutcome::Failed {
                    written: failure.written,
                    restored: failure.restored,
                    error: failure.error,
                }
            }
        }
    }

    pub(crate) fn record_success(&self) {
        self.state.send_modify(|s| {
            s.last_flush_at = Some(Utc::now());
            s.last_error = None;
            s.consecutive_failures = 0;
            s.flush_count += 1;
        });
    }

    pub(crate) fn record_failure(&self, error: &GatewayError) {
        self.state.send_modify(|s| {
            s.last_error = Some(error.to_string());
            s.consecutive_failures += 1;
        });
    }

    /// Drive `tick` forever at the configured cadence.
    ///
    /// The returned future never completes; the owner aborts the task that
    /// runs it. A flush interrupted that way puts its unwritten answers back
    /// into the dirty set.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    /// Stop starting new flushes. A flush already in flight runs to
    /// completion.
    pub fn suspend(&self) {
        self.state.send_modify(|s| s.suspended = true);
    }

    /// Wait until no flush is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|s| !s.in_flight).await;
    }

    pub fn is_in_flight(&self) -> bool {
        self.state.borrow().in_flight
    }

    /// Subscribe to sync state changes (for a live degraded-sync indicator).
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> SyncStatus {
        let pending = lock_store(&self.store).dirty_count();
        let state = self.state.borrow();
        SyncStatus {
            degraded: state.last_error.is_some(),
            in_flight: state.in_flight,
            pending,
            last_flush_at: state.last_flush_at,
            last_error: state.last_error.clone(),
            consecutive_failures: state.consecutive_failures,
        }
    }
}

struct InFlightGuard<'a> {
    state: &'a watch::Sender<SyncState>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.state.send_modify(|s| s.in_flight = false);
    }
}

/// A failed batch write.
#[derive(Debug)]
pub(crate) struct WriteFailure {
    pub error: GatewayError,
    pub written: usize,
    pub restored: usize,
}

/// Writes not yet acknowledged. Whatever is left when this is dropped,
/// whether after an error or because the future was cancelled, goes back
/// into the dirty set.
struct Unsent<'a> {
    store: &'a Mutex<AnswerStore>,
    writes: VecDeque<PendingWrite>,
}

impl Drop for Unsent<'_> {
    fn drop(&mut self) {
        if !self.writes.is_empty() {
            let remaining: Vec<PendingWrite> = self.writes.drain(..).collect();
            lock_store(self.store).restore(&remaining);
        }
    }
}

/// Write a drained batch in edit order, stopping at the first failure.
pub(crate) async fn write_batch(
    gateway: &dyn Gateway,
    attempt_id: &str,
    store: &Mutex<AnswerStore>,
    batch: Vec<PendingWrite>,
) -> Result<usize, WriteFailure> {
    let mut unsent = Unsent {
        store,
        writes: batch.into(),
    };
    let mut written = 0;

    while let Some(write) = unsent.writes.front() {
        let request = SaveAnswerRequest {
            attempt_id: attempt_id.to_string(),
            question_id: write.question_id.clone(),
            value: write.value.clone(),
            version: write.version,
        };
        match gateway.save_answer(&request).await {
            Ok(_ack) => {
                lock_store(store).mark_synced(&request.question_id, request.version);
                unsent.writes.pop_front();
                written += 1;
            }
            Err(error) => {
                let restored = unsent.writes.len();
                drop(unsent);
                return Err(WriteFailure {
                    error,
                    written,
                    restored,
                });
            }
        }
    }

    Ok(written)
}
