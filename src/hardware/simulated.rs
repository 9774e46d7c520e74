use async_trait::async_trait;
use chrono::{TimeZone, Timelike};
use chrono_tz::Tz;
use rand::Rng;
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::sync::Arc;

use super::{FetchError, Fetcher};
use crate::clock::Clock;
use crate::domain::{PanelReading, Snapshot};

/// Gateway stand-in producing a clear-sky production curve.
///
/// Like the real CCA it goes dark at night: outside `sunrise_hour..sunset_hour`
/// every fetch fails with a connection failure.
pub struct SimulatedGateway {
    panel_ids: Vec<String>,
    peak_power_w: f64,
    sunrise_hour: f64,
    sunset_hour: f64,
    /// Relative noise on power and voltage readings (0.02 = ±2%)
    pub noise: f64,
    tz: Tz,
    clock: Arc<dyn Clock>,
}

impl SimulatedGateway {
    pub fn new(panel_count: usize, peak_power_w: f64, tz: Tz, clock: Arc<dyn Clock>) -> Self {
        Self {
            panel_ids: (1..=panel_count).map(|i| format!("A{i}")).collect(),
            peak_power_w,
            sunrise_hour: 6.0,
            sunset_hour: 20.0,
            noise: 0.02,
            tz,
            clock,
        }
    }

    /// Noise-free production at a local fractional hour
    fn clear_sky_power(&self, hour: f64) -> Option<f64> {
        if hour < self.sunrise_hour || hour >= self.sunset_hour {
            return None;
        }
        let phase = (hour - self.sunrise_hour) / (self.sunset_hour - self.sunrise_hour);
        Some(self.peak_power_w * (PI * phase).sin())
    }

    fn jitter(&self, rng: &mut impl Rng, value: f64) -> f64 {
        if self.noise <= 0.0 {
            return value;
        }
        value * (1.0 + rng.gen_range(-self.noise..=self.noise))
    }
}

#[async_trait]
impl Fetcher for SimulatedGateway {
    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let taken_at = self.clock.now();
        let local = self.tz.from_utc_datetime(&taken_at.naive_utc());
        let hour = local.hour() as f64 + local.minute() as f64 / 60.0;

        let Some(base_power) = self.clear_sky_power(hour) else {
            return Err(FetchError::ConnectionFailure("gateway asleep".to_string()));
        };

        let mut rng = rand::thread_rng();
        let panels = self
            .panel_ids
            .iter()
            .map(|id| {
                let mut reading = PanelReading {
                    power_w: Some(self.jitter(&mut rng, base_power)),
                    voltage_v: Some(self.jitter(&mut rng, 34.0)),
                    current_a: None,
                    rssi_dbm: Some(rng.gen_range(-72.0..=-58.0)),
                    temperature_c: Some(15.0 + base_power / self.peak_power_w * 30.0),
                    timestamp: taken_at,
                };
                reading.derive_current();
                (id.clone(), reading)
            })
            .collect::<BTreeMap<_, _>>();

        Ok(Snapshot::new(taken_at, panels))
    }

    fn describe(&self) -> String {
        format!("simulated ({} panels)", self.panel_ids.len())
    }
}
