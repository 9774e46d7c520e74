use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::hardware::FetchError;

/// Keeps a sleeping gateway from flooding the log.
///
/// The first failure of an outage is a warning, after that at most one warning
/// per window. Everything else goes to debug. A success after failures logs the
/// recovery once.
#[derive(Debug, Clone)]
pub struct FailureLog {
    source: &'static str,
    window: chrono::Duration,
    last_warn: Option<DateTime<Utc>>,
    failures: u32,
}

impl FailureLog {
    pub fn new(source: &'static str, window: Duration) -> Self {
        Self {
            source,
            window: chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero()),
            last_warn: None,
            failures: 0,
        }
    }

    /// Failed attempts since the last success
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failed attempt. Returns whether it was logged at warn level.
    pub fn failure(&mut self, now: DateTime<Utc>, attempt: u32, error: &FetchError) -> bool {
        self.failures = self.failures.saturating_add(1);

        let due = match self.last_warn {
            None => true,
            Some(at) => now - at >= self.window,
        };

        if due {
            self.last_warn = Some(now);
            warn!(
                source = self.source,
                attempt,
                failures = self.failures,
                kind = %error.kind(),
                error = %error,
                "gateway unavailable"
            );
        } else {
            debug!(
                source = self.source,
                attempt,
                failures = self.failures,
                kind = %error.kind(),
                error = %error,
                "gateway still unavailable"
            );
        }
        due
    }

    /// Record a success. Returns the number of failures it ended.
    pub fn success(&mut self) -> u32 {
        let ended = self.failures;
        if ended > 0 {
            info!(source = self.source, failed_attempts = ended, "gateway reachable again");
        }
        self.failures = 0;
        self.last_warn = None;
        ended
    }
}
