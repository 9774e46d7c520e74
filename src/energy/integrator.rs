use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference sample the next trapezoid starts from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegratorState {
    pub last_timestamp: DateTime<Utc>,
    pub last_power_w: f64,
}

/// Trapezoidal integration of a power stream (W) into a running energy total (kWh).
///
/// The total never decreases: negative power is clamped to zero and samples that
/// are not strictly newer than the reference point are dropped without mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnergyIntegrator {
    reference: Option<IntegratorState>,
    cumulative_kwh: f64,
}

impl EnergyIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a restored total. There is no reference point yet, so the first
    /// live sample only anchors the integration.
    pub fn seeded(cumulative_kwh: f64) -> Self {
        Self {
            reference: None,
            cumulative_kwh: cumulative_kwh.max(0.0),
        }
    }

    pub fn cumulative_kwh(&self) -> f64 {
        self.cumulative_kwh
    }

    pub fn state(&self) -> Option<IntegratorState> {
        self.reference
    }

    /// Feed one sample and return the cumulative energy afterwards.
    pub fn update(&mut self, power_w: Option<f64>, timestamp: DateTime<Utc>) -> f64 {
        let Some(power_w) = power_w.filter(|p| p.is_finite()) else {
            return self.cumulative_kwh;
        };
        let power_w = power_w.max(0.0);

        let Some(reference) = self.reference else {
            self.reference = Some(IntegratorState {
                last_timestamp: timestamp,
                last_power_w: power_w,
            });
            return self.cumulative_kwh;
        };

        let dt = timestamp - reference.last_timestamp;
        let dt_s = match dt.num_microseconds() {
            Some(us) => us as f64 / 1e6,
            None => dt.num_milliseconds() as f64 / 1e3,
        };
        if dt_s <= 0.0 {
            return self.cumulative_kwh;
        }

        let wh = ((reference.last_power_w + power_w) / 2.0) * dt_s / 3600.0;
        self.cumulative_kwh += wh / 1000.0;
        self.reference = Some(IntegratorState {
            last_timestamp: timestamp,
            last_power_w: power_w,
        });
        self.cumulative_kwh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(secs)
    }

    #[test]
    fn test_one_hour_trapezoid() {
        let mut integrator = EnergyIntegrator::new();
        assert_eq!(integrator.update(Some(100.0), at(0)), 0.0);
        let kwh = integrator.update(Some(200.0), at(3600));
        assert!((kwh - 0.15).abs() < 1e-12, "got {kwh}");
    }

    #[test]
    fn test_first_sample_only_anchors_seeded_total() {
        let mut integrator = EnergyIntegrator::seeded(5.2);
        assert_eq!(integrator.update(Some(400.0), at(0)), 5.2);
        assert_eq!(integrator.state().map(|s| s.last_power_w), Some(400.0));
    }

    #[test]
    fn test_missing_power_leaves_state_unchanged() {
        let mut integrator = EnergyIntegrator::new();
        integrator.update(Some(100.0), at(0));
        let before = integrator.clone();
        integrator.update(None, at(600));
        integrator.update(Some(f64::NAN), at(700));
        assert_eq!(integrator, before);
    }

    #[test]
    fn test_sub_millisecond_step_is_integrated() {
        let mut integrator = EnergyIntegrator::new();
        integrator.update(Some(3600.0), t0());
        let kwh = integrator.update(Some(3600.0), t0() + Duration::microseconds(500));
        // 3600 W for 0.5 ms is 0.5 mWh
        assert!((kwh - 5e-7).abs() < 1e-15, "got {kwh}");
        assert_eq!(
            integrator.state().map(|s| s.last_timestamp),
            Some(t0() + Duration::microseconds(500))
        );
    }

    #[test]
    fn test_negative_power_is_clamped() {
        let mut integrator = EnergyIntegrator::new();
        integrator.update(Some(-50.0), at(0));
        let kwh = integrator.update(Some(-20.0), at(3600));
        assert_eq!(kwh, 0.0);

        let kwh = integrator.update(Some(100.0), at(7200));
        assert!((kwh - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_stale_and_duplicate_timestamps_are_ignored() {
        let mut integrator = EnergyIntegrator::new();
        integrator.update(Some(100.0), at(0));
        integrator.update(Some(100.0), at(1800));
        let before = integrator.clone();

        integrator.update(Some(5000.0), at(1800));
        integrator.update(Some(5000.0), at(900));
        assert_eq!(integrator, before);
    }

    fn samples() -> impl Strategy<Value = Vec<(i64, f64)>> {
        prop::collection::vec((1i64..7200, 0.0f64..5000.0), 1..40).prop_map(|steps| {
            let mut t = 0;
            steps
                .into_iter()
                .map(|(dt, p)| {
                    t += dt;
                    (t, p)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_matches_running_trapezoid_sum(series in samples()) {
            let mut integrator = EnergyIntegrator::new();
            let mut expected = 0.0;
            let mut previous: Option<(i64, f64)> = None;
            let mut last_total = 0.0;

            for (t, p) in series {
                let total = integrator.update(Some(p), at(t));
                if let Some((pt, pp)) = previous {
                    expected += ((pp + p) / 2.0) * (t - pt) as f64 / 3600.0 / 1000.0;
                }
                previous = Some((t, p));

                prop_assert!((total - expected).abs() < 1e-9);
                prop_assert!(total >= last_total);
                last_total = total;
            }
        }

        #[test]
        fn prop_never_decreases(series in prop::collection::vec((-3600i64..7200, -500.0f64..5000.0), 1..60)) {
            let mut integrator = EnergyIntegrator::new();
            let mut last_total = 0.0;
            for (t, p) in series {
                let total = integrator.update(Some(p), at(t));
                prop_assert!(total >= last_total);
                last_total = total;
            }
        }
    }
}
