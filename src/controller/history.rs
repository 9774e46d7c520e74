use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::failure_log::FailureLog;
use super::view::ViewPublisher;
use crate::clock::Clock;
use crate::config::DeviceConfig;
use crate::domain::local_date;
use crate::energy::EnergyHistory;
use crate::hardware::{FetchError, HistoryFetcher};

/// Refreshes the gateway's daily production history.
///
/// Runs next to the polling loop with its own cadence. One attempt per tick;
/// a failure just leaves the previous summary in place.
pub struct HistoryPoller {
    fetcher: Arc<dyn HistoryFetcher>,
    clock: Arc<dyn Clock>,
    publisher: Arc<ViewPublisher>,
    tz: Tz,
    interval: Duration,
    fetch_timeout: Duration,
    failures: FailureLog,
}

impl HistoryPoller {
    pub fn new(
        fetcher: Arc<dyn HistoryFetcher>,
        clock: Arc<dyn Clock>,
        publisher: Arc<ViewPublisher>,
        tz: Tz,
        interval: Duration,
        log_window: Duration,
    ) -> Self {
        Self {
            fetcher,
            clock,
            publisher,
            tz,
            interval,
            fetch_timeout: DeviceConfig::default().fetch_timeout(),
            failures: FailureLog::new("history", log_window),
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                _ = self.refresh() => {}
            }
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                _ = self.clock.sleep(self.interval) => {}
            }
        }
    }

    /// Fetch once and publish the summary. Returns whether it succeeded.
    pub async fn refresh(&mut self) -> bool {
        let result = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch_history())
            .await
            .unwrap_or_else(|_| Err(FetchError::Timeout(self.fetch_timeout)));

        let now = self.clock.now();
        match result {
            Ok(entries) => {
                let summary = EnergyHistory::summarize(entries, local_date(now, &self.tz));
                debug!(
                    today_kwh = ?summary.today_kwh,
                    last_7_days_kwh = summary.last_7_days_kwh,
                    "history refreshed"
                );
                self.publisher.publish(|view| {
                    view.history = Some(summary);
                    view.history_updated = Some(now);
                });
                self.failures.success();
                true
            }
            Err(e) => {
                self.failures.failure(now, 1, &e);
                false
            }
        }
    }
}
