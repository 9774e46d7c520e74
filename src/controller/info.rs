use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::failure_log::FailureLog;
use super::view::ViewPublisher;
use crate::clock::Clock;
use crate::config::DeviceConfig;
use crate::hardware::{FetchError, InfoFetcher};

/// Keeps the installation layout and gateway system info in the view.
///
/// Both rarely change, so this runs on a slow cadence next to the polling
/// loop. Whatever part of a refresh succeeds is published; the other part
/// keeps its previous value.
pub struct GatewayInfoPoller {
    fetcher: Arc<dyn InfoFetcher>,
    clock: Arc<dyn Clock>,
    publisher: Arc<ViewPublisher>,
    interval: Duration,
    fetch_timeout: Duration,
    failures: FailureLog,
}

impl GatewayInfoPoller {
    pub fn new(
        fetcher: Arc<dyn InfoFetcher>,
        clock: Arc<dyn Clock>,
        publisher: Arc<ViewPublisher>,
        interval: Duration,
        log_window: Duration,
    ) -> Self {
        Self {
            fetcher,
            clock,
            publisher,
            interval,
            fetch_timeout: DeviceConfig::default().fetch_timeout(),
            failures: FailureLog::new("gateway_info", log_window),
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

    async fn timed<T>(
        &self,
        fut: impl Future<Output = Result<T, FetchError>>,
    ) -> Result<T, FetchError> {
        tokio::time::timeout(self.fetch_timeout, fut)
            .await
            .unwrap_or_else(|_| Err(FetchError::Timeout(self.fetch_timeout)))
    }

    /// Fetch layout and system info once. Returns whether both succeeded.
    pub async fn refresh(&mut self) -> bool {
        let (layout, system) = tokio::join!(
            self.timed(self.fetcher.fetch_layout()),
            self.timed(self.fetcher.fetch_system_info()),
        );
        let now = self.clock.now();
        let failed = layout.as_ref().err().or(system.as_ref().err()).cloned();
        let layout = layout.ok();
        let system = system.ok();

        if layout.is_some() || system.is_some() {
            debug!(
                layout_panels = ?layout.as_ref().map(|l| l.panels.len()),
                system = system.is_some(),
                "gateway info refreshed"
            );
            self.publisher.publish(|view| {
                if layout.is_some() {
                    view.layout = layout;
                }
                if system.is_some() {
                    view.system = system;
                }
                view.info_updated = Some(now);
            });
        }

        match failed {
            Some(e) => {
                self.failures.failure(now, 1, &e);
                false
            }
            None => {
                self.failures.success();
                true
            }
        }
    }
}
