//! Advisory attempt timer.

use std::time::Duration;

use tokio::time::Instant;

/// Free-running elapsed-time counter for an attempt.
///
/// Runs only while started; `stop` freezes the accumulated time. It never
/// acts on expiry itself, callers poll `is_expired` and decide.
#[derive(Debug, Clone, Default)]
pub struct SessionTimer {
    running_since: Option<Instant>,
    accumulated: Duration,
    limit: Option<Duration>,
}

impl SessionTimer {
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            running_since: None,
            accumulated: Duration::ZERO,
            limit,
        }
    }

    /// A stopped timer that has already counted `elapsed` (used when an
    /// attempt is resumed).
    pub fn with_elapsed(limit: Option<Duration>, elapsed: Duration) -> Self {
        Self {
            running_since: None,
            accumulated: elapsed,
            limit,
        }
    }

    /// Start counting (idempotent while running).
    pub fn start(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    /// Stop counting, keeping the elapsed time.
    pub fn stop(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn elapsed(&self) -> Duration {
        self.accumulated + self.running_since.map(|s| s.elapsed()).unwrap_or_default()
    }

    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }

    /// Time left before the limit, saturating at zero. `None` without a limit.
    pub fn remaining(&self) -> Option<Duration> {
        self.limit.map(|l| l.saturating_sub(self.elapsed()))
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|r| r.is_zero())
    }
}
