//! Energy accounting: trapezoidal integration of panel power into a cumulative
//! total, plus day/month baselines on top of it.

pub mod history;
pub mod integrator;
pub mod period;

pub use history::{DailyEnergy, EnergyHistory, HistorySummary};
pub use integrator::{EnergyIntegrator, IntegratorState};
pub use period::{PeriodBaseline, PeriodEnergy, PeriodTracker};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::domain::{PeriodKind, Snapshot};

/// Accounting state carried across restarts for one panel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub cumulative_energy_kwh: f64,
    #[serde(default)]
    pub periods: BTreeMap<PeriodKind, PeriodBaseline>,
}

/// Per-panel accounting
#[derive(Debug, Clone)]
pub struct PanelEnergy {
    integrator: EnergyIntegrator,
    day: PeriodTracker,
    month: PeriodTracker,
}

impl PanelEnergy {
    fn new(seed: Option<PersistedState>) -> Self {
        let Some(seed) = seed else {
            return Self {
                integrator: EnergyIntegrator::new(),
                day: PeriodTracker::new(PeriodKind::Day),
                month: PeriodTracker::new(PeriodKind::Month),
            };
        };

        let total = seed.cumulative_energy_kwh.max(0.0);
        let tracker = |kind: PeriodKind| match seed.periods.get(&kind) {
            Some(b) if b.baseline_kwh > total => {
                warn!(
                    period = %kind,
                    baseline_kwh = b.baseline_kwh,
                    cumulative_kwh = total,
                    "restored baseline above cumulative total, clamping"
                );
                PeriodTracker::seeded(
                    kind,
                    PeriodBaseline {
                        period_key: b.period_key.clone(),
                        baseline_kwh: total,
                    },
                )
            }
            Some(b) => PeriodTracker::seeded(kind, b.clone()),
            None => PeriodTracker::new(kind),
        };

        Self {
            integrator: EnergyIntegrator::seeded(total),
            day: tracker(PeriodKind::Day),
            month: tracker(PeriodKind::Month),
        }
    }

    pub fn cumulative_kwh(&self) -> f64 {
        self.integrator.cumulative_kwh()
    }

    pub fn period(&self, kind: PeriodKind) -> PeriodEnergy {
        let total = self.cumulative_kwh();
        match kind {
            PeriodKind::Day => self.day.current(total),
            PeriodKind::Month => self.month.current(total),
        }
    }

    fn persisted(&self) -> PersistedState {
        let periods = [&self.day, &self.month]
            .into_iter()
            .filter_map(|t| t.baseline().map(|b| (t.kind(), b.clone())))
            .collect();
        PersistedState {
            cumulative_energy_kwh: self.cumulative_kwh(),
            periods,
        }
    }
}

/// All panels' accounting, mutated only by the polling loop.
#[derive(Debug, Clone)]
pub struct EnergyLedger {
    tz: Tz,
    panels: BTreeMap<String, PanelEnergy>,
}

impl EnergyLedger {
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            panels: BTreeMap::new(),
        }
    }

    pub fn is_tracked(&self, panel_id: &str) -> bool {
        self.panels.contains_key(panel_id)
    }

    /// Start tracking a panel, optionally from a restored state. Already tracked
    /// panels are left untouched.
    pub fn track(&mut self, panel_id: &str, seed: Option<PersistedState>) {
        if !self.is_tracked(panel_id) {
            self.panels.insert(panel_id.to_string(), PanelEnergy::new(seed));
        }
    }

    pub fn panel(&self, panel_id: &str) -> Option<&PanelEnergy> {
        self.panels.get(panel_id)
    }

    pub fn panels(&self) -> impl Iterator<Item = (&String, &PanelEnergy)> {
        self.panels.iter()
    }

    /// Integrate a snapshot and advance every tracked panel's period baselines.
    ///
    /// Panels first seen in the snapshot start from zero; seed them with
    /// [`EnergyLedger::track`] beforehand to continue from a restored state.
    pub fn apply(&mut self, snapshot: &Snapshot, now: DateTime<Utc>) {
        for panel_id in snapshot.panels().keys() {
            self.track(panel_id, None);
        }

        for (panel_id, panel) in self.panels.iter_mut() {
            if let Some(reading) = snapshot.get(panel_id) {
                panel.integrator.update(reading.power_w, reading.timestamp);
            }
            let total = panel.integrator.cumulative_kwh();
            panel.day.update(total, now, &self.tz);
            panel.month.update(total, now, &self.tz);
        }
    }

    pub fn persisted_states(&self) -> BTreeMap<String, PersistedState> {
        self.panels
            .iter()
            .map(|(id, p)| (id.clone(), p.persisted()))
            .collect()
    }
}
