//! End-to-end polling scenarios driven by a hand-advanced clock.
//!
//! No test here waits in real time: backoff and poll waits go through
//! `ManualClock`, fetch timeouts through tokio's paused clock.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use panel_energy_monitor::clock::ManualClock;
use panel_energy_monitor::config::SchedulerConfig;
use panel_energy_monitor::controller::{Liveness, Scheduler, SchedulerPhase, ViewPublisher};
use panel_energy_monitor::domain::{PanelReading, PeriodKind, Snapshot};
use panel_energy_monitor::energy::{EnergyLedger, PeriodBaseline, PersistedState};
use panel_energy_monitor::hardware::{FetchError, FetchErrorKind, Fetcher, ScriptedFetcher};
use panel_energy_monitor::repo::MemoryStore;

fn may_first(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
}

fn snapshot(at: DateTime<Utc>, power_w: f64) -> Snapshot {
    let mut panels = BTreeMap::new();
    panels.insert("A1".to_string(), PanelReading::with_power(at, power_w));
    Snapshot::new(at, panels)
}

fn secs(list: &[u64]) -> Vec<Duration> {
    list.iter().copied().map(Duration::from_secs).collect()
}

/// A gateway that accepts the connection and never answers
struct HangingFetcher;

#[async_trait]
impl Fetcher for HangingFetcher {
    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        std::future::pending().await
    }

    fn describe(&self) -> String {
        "hanging".to_string()
    }
}

#[tokio::test]
async fn test_startup_exhausts_all_attempts_without_data() {
    let clock = Arc::new(ManualClock::new(may_first(22, 0, 0)));
    let fetcher = Arc::new(ScriptedFetcher::always_failing());
    let publisher = Arc::new(ViewPublisher::new());
    let mut scheduler = Scheduler::new(
        fetcher.clone(),
        clock.clone(),
        Arc::new(MemoryStore::new()),
        publisher.clone(),
        EnergyLedger::new(Tz::UTC),
        SchedulerConfig::default(),
    );

    let got_data = scheduler.startup_burst(&CancellationToken::new()).await;

    assert!(!got_data);
    assert_eq!(fetcher.attempts(), 6);
    assert_eq!(clock.sleeps(), secs(&[10, 20, 30, 40, 50]));

    let view = publisher.snapshot();
    assert_eq!(view.liveness(), Liveness::NeverSucceeded);
    assert_eq!(view.poll.consecutive_failures, 6);
    assert_eq!(view.poll.last_error, Some(FetchErrorKind::ConnectionFailure));
    assert!(view.current_reading("A1").is_none());
}

#[tokio::test]
async fn test_degraded_start_recovers_then_goes_stale() {
    let clock = Arc::new(ManualClock::new(may_first(5, 0, 0)));
    let shutdown = CancellationToken::new();
    let t0 = may_first(5, 0, 0);
    let outcomes = (0..6)
        .map(|_| Err::<Snapshot, _>(FetchError::ConnectionFailure("asleep".into())))
        .chain([Ok(snapshot(t0 + chrono::Duration::seconds(180), 20.0))]);
    let fetcher =
        Arc::new(ScriptedFetcher::new(outcomes).cancel_when_exhausted(shutdown.clone()));
    let publisher = Arc::new(ViewPublisher::new());
    let store = Arc::new(MemoryStore::new());

    Scheduler::new(
        fetcher.clone(),
        clock.clone(),
        store.clone(),
        publisher.clone(),
        EnergyLedger::new(Tz::UTC),
        SchedulerConfig::default(),
    )
    .run(shutdown.clone())
    .await;

    // five startup backoffs, then two poll waits; the last cycle stops on shutdown
    assert_eq!(clock.sleeps(), secs(&[10, 20, 30, 40, 50, 30, 30]));
    assert_eq!(fetcher.attempts(), 8);

    let view = publisher.snapshot();
    assert_eq!(view.poll.phase, SchedulerPhase::Stopped);
    assert_eq!(view.liveness(), Liveness::Stale);
    assert_eq!(view.poll.last_success, Some(t0 + chrono::Duration::seconds(180)));
    assert_eq!(
        view.current_reading("A1").and_then(|r| r.power_w),
        Some(20.0)
    );
    assert_eq!(store.save_count(), 1);
}

#[tokio::test]
async fn test_restart_continues_from_stored_state() {
    let mut periods = BTreeMap::new();
    periods.insert(
        PeriodKind::Day,
        PeriodBaseline {
            period_key: "2024-05-01".into(),
            baseline_kwh: 5.0,
        },
    );
    let store = Arc::new(MemoryStore::with_state(
        "A1",
        PersistedState {
            cumulative_energy_kwh: 5.2,
            periods,
        },
    ));

    let clock = Arc::new(ManualClock::new(may_first(10, 0, 0)));
    let shutdown = CancellationToken::new();
    let fetcher = Arc::new(
        ScriptedFetcher::new([
            Ok(snapshot(may_first(10, 0, 0), 300.0)),
            Ok(snapshot(may_first(10, 0, 30), 300.0)),
        ])
        .cancel_when_exhausted(shutdown.clone()),
    );
    let publisher = Arc::new(ViewPublisher::new());

    Scheduler::new(
        fetcher,
        clock,
        store.clone(),
        publisher.clone(),
        EnergyLedger::new(Tz::UTC),
        SchedulerConfig::default(),
    )
    .run(shutdown)
    .await;

    // consulted once, before the first sample
    assert_eq!(store.loads(), vec!["A1".to_string()]);

    // 300 W for 30 s on top of the restored total
    let expected_total = 5.2 + 300.0 * 30.0 / 3600.0 / 1000.0;
    let view = publisher.snapshot();
    let total = view.cumulative_energy("A1").unwrap();
    assert!((total - expected_total).abs() < 1e-12);

    let day = view.period_energy("A1", PeriodKind::Day).unwrap();
    assert_eq!(day.period_key.as_deref(), Some("2024-05-01"));
    assert!((day.value_kwh - (expected_total - 5.0)).abs() < 1e-12);

    // saved on the first success and once more on shutdown
    assert_eq!(store.save_count(), 2);
    let saved = &store.states()["A1"];
    assert!((saved.cumulative_energy_kwh - expected_total).abs() < 1e-12);
    assert_eq!(saved.periods[&PeriodKind::Day].baseline_kwh, 5.0);
    assert_eq!(saved.periods[&PeriodKind::Month].period_key, "2024-05");
}

#[tokio::test(start_paused = true)]
async fn test_hanging_fetch_times_out() {
    let clock = Arc::new(ManualClock::new(may_first(12, 0, 0)));
    let publisher = Arc::new(ViewPublisher::new());
    let cfg = SchedulerConfig {
        startup_max_attempts: 2,
        ..SchedulerConfig::default()
    };
    let mut scheduler = Scheduler::new(
        Arc::new(HangingFetcher),
        clock.clone(),
        Arc::new(MemoryStore::new()),
        publisher.clone(),
        EnergyLedger::new(Tz::UTC),
        cfg,
    )
    .with_fetch_timeout(Duration::from_secs(3));

    let started = tokio::time::Instant::now();
    assert!(!scheduler.startup_burst(&CancellationToken::new()).await);

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(7));
    assert_eq!(clock.sleeps(), secs(&[10]));
    let view = publisher.snapshot();
    assert_eq!(view.poll.last_error, Some(FetchErrorKind::Timeout));
    assert_eq!(view.poll.consecutive_failures, 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_in_flight_fetch() {
    let clock = Arc::new(ManualClock::new(may_first(12, 0, 0)));
    let publisher = Arc::new(ViewPublisher::new());
    let store = Arc::new(MemoryStore::new());
    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::new(
        Arc::new(HangingFetcher),
        clock,
        store.clone(),
        publisher.clone(),
        EnergyLedger::new(Tz::UTC),
        SchedulerConfig::default(),
    )
    .with_fetch_timeout(Duration::from_secs(9));

    let canceller = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let started = tokio::time::Instant::now();
    scheduler.run(shutdown).await;

    assert!(started.elapsed() < Duration::from_secs(1));
    let view = publisher.snapshot();
    assert_eq!(view.poll.phase, SchedulerPhase::Stopped);
    assert_eq!(view.liveness(), Liveness::NeverSucceeded);
    // nothing changed, nothing to save
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn test_rollover_at_midnight_resets_day_and_month() {
    let before = Utc.with_ymd_and_hms(2024, 5, 31, 23, 59, 0).unwrap();
    let after = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 30).unwrap();
    let clock = Arc::new(ManualClock::new(before));
    let fetcher = Arc::new(ScriptedFetcher::new([
        Ok(snapshot(before, 360.0)),
        Ok(snapshot(before + chrono::Duration::seconds(30), 360.0)),
    ]));
    let publisher = Arc::new(ViewPublisher::new());
    let mut scheduler = Scheduler::new(
        fetcher.clone(),
        clock.clone(),
        Arc::new(MemoryStore::new()),
        publisher.clone(),
        EnergyLedger::new(Tz::UTC),
        SchedulerConfig::default(),
    );
    let token = CancellationToken::new();

    assert!(scheduler.startup_burst(&token).await);
    clock.advance(Duration::from_secs(30));
    assert!(scheduler.run_cycle(&token).await);

    let view = publisher.snapshot();
    let may_day = view.period_energy("A1", PeriodKind::Day).unwrap().clone();
    assert_eq!(may_day.period_key.as_deref(), Some("2024-05-31"));
    assert!((may_day.value_kwh - 0.003).abs() < 1e-12);

    clock.set(after);
    fetcher.push(Ok(snapshot(after, 360.0)));
    assert!(scheduler.run_cycle(&token).await);

    let view = publisher.snapshot();
    let total = view.cumulative_energy("A1").unwrap();
    for kind in [PeriodKind::Day, PeriodKind::Month] {
        let period = view.period_energy("A1", kind).unwrap();
        assert_eq!(period.value_kwh, 0.0);
        assert_eq!(period.baseline_kwh, total);
    }
    assert_eq!(
        view.period_energy("A1", PeriodKind::Month).unwrap().period_key.as_deref(),
        Some("2024-06")
    );

    clock.advance(Duration::from_secs(30));
    fetcher.push(Ok(snapshot(after + chrono::Duration::seconds(30), 360.0)));
    assert!(scheduler.run_cycle(&token).await);

    let view = publisher.snapshot();
    let day = view.period_energy("A1", PeriodKind::Day).unwrap();
    assert_eq!(day.period_key.as_deref(), Some("2024-06-01"));
    assert!((day.value_kwh - 0.003).abs() < 1e-12);
    // cumulative never drops across the boundary
    assert!(view.cumulative_energy("A1").unwrap() > total);
}

#[tokio::test]
async fn test_empty_snapshot_is_not_data() {
    let evening = may_first(18, 0, 0);
    let dawn = Utc.with_ymd_and_hms(2024, 5, 2, 5, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(evening));
    let fetcher = Arc::new(ScriptedFetcher::new([Ok(snapshot(evening, 250.0))]));
    let publisher = Arc::new(ViewPublisher::new());
    let mut scheduler = Scheduler::new(
        fetcher.clone(),
        clock.clone(),
        Arc::new(MemoryStore::new()),
        publisher.clone(),
        EnergyLedger::new(Tz::UTC),
        SchedulerConfig {
            steady_retry_attempts: 0,
            ..SchedulerConfig::default()
        },
    );
    let token = CancellationToken::new();
    assert!(scheduler.startup_burst(&token).await);

    // the gateway is up again but has no rows for the new day yet
    clock.set(dawn);
    fetcher.push(Ok(Snapshot::new(dawn, BTreeMap::new())));
    assert!(!scheduler.run_cycle(&token).await);

    let view = publisher.snapshot();
    assert_eq!(view.liveness(), Liveness::Stale);
    assert_eq!(view.poll.last_success, Some(evening));
    assert_eq!(view.poll.last_error, Some(FetchErrorKind::MalformedResponse));
    let reading = view.current_reading("A1").unwrap();
    assert_eq!(reading.timestamp, evening);
    assert_eq!(view.panel_liveness("A1"), Some(Liveness::Stale));
}

#[tokio::test]
async fn test_empty_snapshot_does_not_end_startup() {
    let clock = Arc::new(ManualClock::new(may_first(4, 0, 0)));
    let fetcher = Arc::new(ScriptedFetcher::new([
        Ok(Snapshot::new(may_first(4, 0, 0), BTreeMap::new())),
        Ok(snapshot(may_first(4, 0, 10), 5.0)),
    ]));
    let publisher = Arc::new(ViewPublisher::new());
    let mut scheduler = Scheduler::new(
        fetcher.clone(),
        clock.clone(),
        Arc::new(MemoryStore::new()),
        publisher.clone(),
        EnergyLedger::new(Tz::UTC),
        SchedulerConfig::default(),
    );

    assert!(scheduler.startup_burst(&CancellationToken::new()).await);
    assert_eq!(fetcher.attempts(), 2);
    assert_eq!(clock.sleeps(), secs(&[10]));
    assert_eq!(
        publisher.snapshot().current_reading("A1").and_then(|r| r.power_w),
        Some(5.0)
    );
}

#[tokio::test]
async fn test_panel_dropping_out_goes_stale_alone() {
    let t0 = may_first(12, 0, 0);
    let t1 = t0 + chrono::Duration::seconds(30);
    let both = {
        let mut panels = BTreeMap::new();
        panels.insert("A1".to_string(), PanelReading::with_power(t0, 200.0));
        panels.insert("A2".to_string(), PanelReading::with_power(t0, 180.0));
        Snapshot::new(t0, panels)
    };
    let clock = Arc::new(ManualClock::new(t0));
    let fetcher = Arc::new(ScriptedFetcher::new([Ok(both), Ok(snapshot(t1, 210.0))]));
    let publisher = Arc::new(ViewPublisher::new());
    let mut scheduler = Scheduler::new(
        fetcher,
        clock.clone(),
        Arc::new(MemoryStore::new()),
        publisher.clone(),
        EnergyLedger::new(Tz::UTC),
        SchedulerConfig::default(),
    );
    let token = CancellationToken::new();

    assert!(scheduler.startup_burst(&token).await);
    clock.advance(Duration::from_secs(30));
    assert!(scheduler.run_cycle(&token).await);

    let view = publisher.snapshot();
    assert_eq!(view.liveness(), Liveness::Fresh);
    assert_eq!(view.panel_liveness("A1"), Some(Liveness::Fresh));
    assert_eq!(view.panel_liveness("A2"), Some(Liveness::Stale));
    // the old value stays visible
    assert_eq!(
        view.current_reading("A2").map(|r| (r.timestamp, r.power_w)),
        Some((t0, Some(180.0)))
    );
}
