//! The read side of the monitor.
//!
//! The polling loop builds a complete [`MonitorView`] after every cycle and swaps
//! it in. Readers clone the `Arc` and never see a half-applied update.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use strum::Display;

use crate::domain::{GatewayLayout, PanelReading, PeriodKind, SystemInfo};
use crate::energy::{HistorySummary, PeriodEnergy};
use crate::hardware::FetchErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Liveness {
    /// No fetch has succeeded since startup
    NeverSucceeded,
    Fresh,
    /// Values are from an earlier cycle, the latest one failed
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SchedulerPhase {
    StartupBurst,
    /// Startup burst exhausted without data, polling continues
    Degraded,
    Steady,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollStatus {
    pub phase: SchedulerPhase,
    pub last_success: Option<DateTime<Utc>>,
    /// Capture time of the latest successful snapshot
    pub last_snapshot_at: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<FetchErrorKind>,
}

impl Default for PollStatus {
    fn default() -> Self {
        Self {
            phase: SchedulerPhase::StartupBurst,
            last_success: None,
            last_snapshot_at: None,
            last_attempt: None,
            consecutive_failures: 0,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelView {
    /// Latest reading, absent until the panel shows up in a snapshot
    pub reading: Option<PanelReading>,
    pub cumulative_energy_kwh: f64,
    pub day: PeriodEnergy,
    pub month: PeriodEnergy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitorView {
    pub poll: PollStatus,
    pub panels: BTreeMap<String, PanelView>,
    pub history: Option<HistorySummary>,
    pub history_updated: Option<DateTime<Utc>>,
    pub layout: Option<GatewayLayout>,
    pub system: Option<SystemInfo>,
    pub info_updated: Option<DateTime<Utc>>,
}

impl MonitorView {
    pub fn liveness(&self) -> Liveness {
        if self.poll.last_success.is_none() {
            Liveness::NeverSucceeded
        } else if self.poll.consecutive_failures > 0 {
            Liveness::Stale
        } else {
            Liveness::Fresh
        }
    }

    /// Liveness of one panel's reading; `None` for unknown panels.
    ///
    /// A panel missing from the latest successful snapshot keeps its last reading,
    /// which is then stale even though the device as a whole is fresh.
    pub fn panel_liveness(&self, panel_id: &str) -> Option<Liveness> {
        let panel = self.panels.get(panel_id)?;
        let device = self.liveness();
        let Some(reading) = panel.reading.as_ref() else {
            return Some(Liveness::NeverSucceeded);
        };
        Some(match device {
            Liveness::Fresh
                if self
                    .poll
                    .last_snapshot_at
                    .is_some_and(|at| reading.timestamp < at) =>
            {
                Liveness::Stale
            }
            other => other,
        })
    }

    /// Absent before the first successful fetch and for unknown panels
    pub fn current_reading(&self, panel_id: &str) -> Option<&PanelReading> {
        if self.liveness() == Liveness::NeverSucceeded {
            return None;
        }
        self.panels.get(panel_id)?.reading.as_ref()
    }

    pub fn cumulative_energy(&self, panel_id: &str) -> Option<f64> {
        self.panels.get(panel_id).map(|p| p.cumulative_energy_kwh)
    }

    pub fn period_energy(&self, panel_id: &str, kind: PeriodKind) -> Option<&PeriodEnergy> {
        let panel = self.panels.get(panel_id)?;
        Some(match kind {
            PeriodKind::Day => &panel.day,
            PeriodKind::Month => &panel.month,
        })
    }
}

/// Copy-and-swap holder of the current view
#[derive(Debug, Default)]
pub struct ViewPublisher {
    current: RwLock<Arc<MonitorView>>,
}

impl ViewPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<MonitorView> {
        self.current.read().clone()
    }

    /// Apply `update` to a copy of the current view and make the copy visible.
    ///
    /// Writers are serialized by the lock, so concurrent publishers never lose
    /// each other's fields.
    pub fn publish(&self, update: impl FnOnce(&mut MonitorView)) -> Arc<MonitorView> {
        let mut current = self.current.write();
        let mut next = MonitorView::clone(&current);
        update(&mut next);
        let next = Arc::new(next);
        *current = next.clone();
        next
    }
}
