//! # Polling scheduler
//!
//! One sequential loop per gateway, with at most one fetch in flight.
//!
//! ```text
//! seed from store ─► StartupBurst ──success──► Steady ◄─┐
//!                        │                      │       │ success
//!                        └─all failed─► Degraded ┴───────┘
//! ```
//!
//! The startup burst retries up to `startup_max_attempts` times, waiting
//! `min(base * i, cap)` after failed attempt `i`. In steady state every
//! `poll_interval` a cycle makes one fetch plus up to `steady_retry_attempts`
//! retries with the same backoff shape, then gives up until the next tick.
//! Failures never escape the loop: the last published values stay visible and
//! are marked stale.
//!
//! Accounting is only mutated after a successful fetch, so cancelling the loop
//! at any await point leaves the ledger consistent.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff::RetryPolicy;
use super::failure_log::FailureLog;
use super::view::{PanelView, PollStatus, SchedulerPhase, ViewPublisher};
use crate::clock::Clock;
use crate::config::{DeviceConfig, EnergyConfig, SchedulerConfig};
use crate::domain::{PanelReading, PeriodKind, Snapshot};
use crate::energy::{EnergyLedger, PersistedState};
use crate::hardware::{FetchError, Fetcher};
use crate::repo::{Persister, Restorer, StateStore};

pub struct Scheduler {
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    store: Arc<dyn StateStore>,
    publisher: Arc<ViewPublisher>,
    cfg: SchedulerConfig,
    fetch_timeout: Duration,
    persist_interval: Duration,
    ledger: EnergyLedger,
    readings: BTreeMap<String, PanelReading>,
    status: PollStatus,
    failures: FailureLog,
    last_persist: Option<DateTime<Utc>>,
    dirty: bool,
}

impl Scheduler {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
        store: Arc<dyn StateStore>,
        publisher: Arc<ViewPublisher>,
        ledger: EnergyLedger,
        cfg: SchedulerConfig,
    ) -> Self {
        let failures = FailureLog::new("poll", cfg.failure_log_window());
        Self {
            fetcher,
            clock,
            store,
            publisher,
            cfg,
            fetch_timeout: DeviceConfig::default().fetch_timeout(),
            persist_interval: EnergyConfig::default().persist_interval(),
            ledger,
            readings: BTreeMap::new(),
            status: PollStatus::default(),
            failures,
            last_persist: None,
            dirty: false,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_persist_interval(mut self, interval: Duration) -> Self {
        self.persist_interval = interval;
        self
    }

    pub fn ledger(&self) -> &EnergyLedger {
        &self.ledger
    }

    /// Drive the loop until `shutdown` is cancelled, then save and mark the view stopped.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(device = %self.fetcher.describe(), "poller starting");
        self.seed_from_store().await;
        self.publish();

        if self.startup_burst(&shutdown).await {
            self.steady_state(&shutdown).await;
        } else if !shutdown.is_cancelled() {
            warn!(
                attempts = self.cfg.startup_max_attempts,
                "no data during startup, continuing in degraded mode"
            );
            self.status.phase = SchedulerPhase::Degraded;
            self.publish();
            self.steady_state(&shutdown).await;
        }

        self.status.phase = SchedulerPhase::Stopped;
        self.publish();
        self.persist(true).await;
        info!("poller stopped");
    }

    /// Load every stored panel before the first fetch
    pub async fn seed_from_store(&mut self) {
        let ids = match self.store.entity_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "failed to list stored panels, starting from zero");
                return;
            }
        };
        for id in ids {
            self.restore(&id).await;
        }
        info!(panels = self.ledger.panels().count(), "energy state restored");
    }

    /// Returns `true` once any attempt succeeds; `false` when all failed or on shutdown.
    pub async fn startup_burst(&mut self, shutdown: &CancellationToken) -> bool {
        let policy = RetryPolicy::startup(&self.cfg);
        self.status.phase = SchedulerPhase::StartupBurst;
        self.burst(policy, shutdown).await
    }

    /// One steady-state cycle: a fetch plus its retries
    pub async fn run_cycle(&mut self, shutdown: &CancellationToken) -> bool {
        let policy = RetryPolicy::steady(&self.cfg);
        self.burst(policy, shutdown).await
    }

    async fn burst(&mut self, policy: RetryPolicy, shutdown: &CancellationToken) -> bool {
        for attempt in 1..=policy.attempts {
            match self.attempt(shutdown).await {
                None => return false,
                Some(Ok(snapshot)) => {
                    self.on_success(snapshot).await;
                    return true;
                }
                Some(Err(e)) => self.on_failure(attempt, &e),
            }

            if attempt < policy.attempts {
                let delay = policy.delay(attempt);
                debug!(attempt, delay_s = delay.as_secs(), "retrying fetch");
                if !self.wait(delay, shutdown).await {
                    return false;
                }
            }
        }
        false
    }

    async fn steady_state(&mut self, shutdown: &CancellationToken) {
        let period = self.cfg.poll_interval();
        let mut next_tick = self.clock.now() + to_chrono(period);

        loop {
            let now = self.clock.now();
            if next_tick > now {
                let wait = (next_tick - now).to_std().unwrap_or(Duration::ZERO);
                if !self.wait(wait, shutdown).await {
                    return;
                }
            }

            self.run_cycle(shutdown).await;
            if shutdown.is_cancelled() {
                return;
            }
            next_tick = next_tick_after(next_tick, period, self.clock.now());
        }
    }

    /// One fetch under the timeout. `None` means shutdown interrupted it.
    async fn attempt(&self, shutdown: &CancellationToken) -> Option<Result<Snapshot, FetchError>> {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            res = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch()) => {
                let res = res.unwrap_or_else(|_| Err(FetchError::Timeout(self.fetch_timeout)));
                Some(res.and_then(non_empty))
            }
        }
    }

    /// Sleep on the injected clock. `false` means shutdown interrupted it.
    async fn wait(&self, duration: Duration, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => false,
            _ = self.clock.sleep(duration) => true,
        }
    }

    async fn restore(&mut self, panel_id: &str) {
        let seed = match self.store.load(panel_id).await {
            Ok(seed) => seed,
            Err(e) => {
                warn!(panel = panel_id, error = %e, "failed to load stored state, starting from zero");
                None
            }
        };
        if let Some(PersistedState { cumulative_energy_kwh, .. }) = &seed {
            debug!(panel = panel_id, cumulative_kwh = cumulative_energy_kwh, "panel restored");
        }
        self.ledger.track(panel_id, seed);
    }

    async fn on_success(&mut self, snapshot: Snapshot) {
        let now = self.clock.now();

        for panel_id in snapshot.panels().keys() {
            if !self.ledger.is_tracked(panel_id) {
                self.restore(panel_id).await;
            }
        }
        self.ledger.apply(&snapshot, now);
        for (panel_id, reading) in snapshot.panels() {
            self.readings.insert(panel_id.clone(), reading.clone());
        }
        let missing = self
            .readings
            .keys()
            .filter(|id| snapshot.get(id).is_none())
            .count();
        if missing > 0 {
            debug!(missing, "panels absent from snapshot keep their last reading as stale");
        }

        if self.status.last_success.is_none() {
            info!(panels = snapshot.len(), "first data received");
        }
        self.failures.success();
        self.status.phase = SchedulerPhase::Steady;
        self.status.last_attempt = Some(now);
        self.status.last_success = Some(now);
        self.status.last_snapshot_at = Some(snapshot.taken_at);
        self.status.consecutive_failures = 0;
        self.status.last_error = None;
        self.dirty = true;

        self.publish();
        self.persist(false).await;
    }

    fn on_failure(&mut self, attempt: u32, error: &FetchError) {
        let now = self.clock.now();
        self.failures.failure(now, attempt, error);
        self.status.last_attempt = Some(now);
        self.status.consecutive_failures = self.status.consecutive_failures.saturating_add(1);
        self.status.last_error = Some(error.kind());
        self.publish();
    }

    fn publish(&self) {
        let panels: BTreeMap<String, PanelView> = self
            .ledger
            .panels()
            .map(|(id, energy)| {
                let view = PanelView {
                    reading: self.readings.get(id).cloned(),
                    cumulative_energy_kwh: energy.cumulative_kwh(),
                    day: energy.period(PeriodKind::Day),
                    month: energy.period(PeriodKind::Month),
                };
                (id.clone(), view)
            })
            .collect();
        let status = self.status.clone();

        self.publisher.publish(move |view| {
            view.poll = status;
            view.panels = panels;
        });
    }

    /// Save when state changed and the interval elapsed, or unconditionally when `force`.
    async fn persist(&mut self, force: bool) {
        if !self.dirty {
            return;
        }
        let now = self.clock.now();
        let due = match self.last_persist {
            None => true,
            Some(at) => now - at >= to_chrono(self.persist_interval),
        };
        if !force && !due {
            return;
        }

        let states = self.ledger.persisted_states();
        match self.store.save(&states).await {
            Ok(()) => {
                self.last_persist = Some(now);
                self.dirty = false;
            }
            Err(e) => warn!(error = %e, panels = states.len(), "failed to save energy state"),
        }
    }
}

/// A snapshot without panels carries no data and counts as a failed fetch
fn non_empty(snapshot: Snapshot) -> Result<Snapshot, FetchError> {
    if snapshot.is_empty() {
        Err(FetchError::MalformedResponse("snapshot holds no panels".to_string()))
    } else {
        Ok(snapshot)
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero())
}

/// First tick on the `prev + k * period` grid strictly after `now`, skipping missed ones.
fn next_tick_after(prev: DateTime<Utc>, period: Duration, now: DateTime<Utc>) -> DateTime<Utc> {
    let step = to_chrono(period);
    let step_ms = step.num_milliseconds().max(1);
    let next = prev + step;
    if next > now {
        return next;
    }
    let missed = (now - prev).num_milliseconds() / step_ms;
    prev + chrono::Duration::milliseconds(step_ms * (missed + 1))
}
