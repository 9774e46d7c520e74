use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::domain::PeriodKind;

/// Cumulative total recorded when a period started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodBaseline {
    pub period_key: String,
    pub baseline_kwh: f64,
}

/// Energy accounted to the current period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodEnergy {
    pub kind: PeriodKind,
    pub value_kwh: f64,
    pub baseline_kwh: f64,
    pub period_key: Option<String>,
}

/// Keeps one baseline per period and reports the non-negative delta since it.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodTracker {
    kind: PeriodKind,
    baseline: Option<PeriodBaseline>,
}

impl PeriodTracker {
    pub fn new(kind: PeriodKind) -> Self {
        Self { kind, baseline: None }
    }

    pub fn seeded(kind: PeriodKind, baseline: PeriodBaseline) -> Self {
        Self {
            kind,
            baseline: Some(baseline),
        }
    }

    pub fn kind(&self) -> PeriodKind {
        self.kind
    }

    pub fn baseline(&self) -> Option<&PeriodBaseline> {
        self.baseline.as_ref()
    }

    /// Roll the baseline over if the period key changed, then report the delta.
    pub fn update(&mut self, total_kwh: f64, now: DateTime<Utc>, tz: &Tz) -> PeriodEnergy {
        let key_now = self.kind.key_at(now, tz);
        let rolled = self
            .baseline
            .as_ref()
            .map_or(true, |b| b.period_key != key_now);

        if rolled {
            tracing::debug!(period = %self.kind, key = %key_now, baseline_kwh = total_kwh, "period baseline reset");
            self.baseline = Some(PeriodBaseline {
                period_key: key_now,
                baseline_kwh: total_kwh,
            });
        }

        self.current(total_kwh)
    }

    /// Delta against the stored baseline without touching it.
    pub fn current(&self, total_kwh: f64) -> PeriodEnergy {
        match &self.baseline {
            Some(b) => PeriodEnergy {
                kind: self.kind,
                value_kwh: (total_kwh - b.baseline_kwh).max(0.0),
                baseline_kwh: b.baseline_kwh,
                period_key: Some(b.period_key.clone()),
            },
            None => PeriodEnergy {
                kind: self.kind,
                value_kwh: 0.0,
                baseline_kwh: total_kwh,
                period_key: None,
            },
        }
    }
}
