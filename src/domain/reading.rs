use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Instantaneous readings of a single panel optimizer.
///
/// Every field is optional: a metric the gateway did not report stays `None`,
/// which is never the same thing as a reported `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelReading {
    pub power_w: Option<f64>,
    pub voltage_v: Option<f64>,
    pub current_a: Option<f64>,
    /// Radio signal strength (dBm)
    pub rssi_dbm: Option<f64>,
    pub temperature_c: Option<f64>,
    /// Capture time of the fetch that produced this reading
    pub timestamp: DateTime<Utc>,
}

impl PanelReading {
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            power_w: None,
            voltage_v: None,
            current_a: None,
            rssi_dbm: None,
            temperature_c: None,
            timestamp,
        }
    }

    pub fn with_power(timestamp: DateTime<Utc>, power_w: f64) -> Self {
        Self {
            power_w: Some(power_w),
            ..Self::empty(timestamp)
        }
    }

    /// Derive the input current from power and voltage.
    ///
    /// Absent when either input is missing, `0.0` when the voltage is not positive.
    pub fn derive_current(&mut self) {
        self.current_a = match (self.power_w, self.voltage_v) {
            (Some(p), Some(v)) if v > 0.0 => Some(((p / v) * 100.0).round() / 100.0),
            (Some(_), Some(_)) => Some(0.0),
            _ => None,
        };
    }
}

/// One successful fetch: readings keyed by panel id.
///
/// Built once by a fetcher and only ever read afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    panels: BTreeMap<String, PanelReading>,
}

impl Snapshot {
    pub fn new(taken_at: DateTime<Utc>, panels: BTreeMap<String, PanelReading>) -> Self {
        Self { taken_at, panels }
    }

    pub fn panels(&self) -> &BTreeMap<String, PanelReading> {
        &self.panels
    }

    pub fn get(&self, panel_id: &str) -> Option<&PanelReading> {
        self.panels.get(panel_id)
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }
}
