use std::time::Duration;

use crate::config::SchedulerConfig;

/// Linear backoff with a cap: the wait after failed attempt `i` (1-indexed) is
/// `min(base * i, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fetches allowed in one burst
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Bounded burst run once before steady state
    pub fn startup(cfg: &SchedulerConfig) -> Self {
        Self {
            attempts: cfg.startup_max_attempts.max(1),
            base_delay: Duration::from_secs(cfg.startup_base_delay_secs),
            max_delay: Duration::from_secs(cfg.startup_max_delay_secs),
        }
    }

    /// One scheduled fetch plus `steady_retry_attempts` retries
    pub fn steady(cfg: &SchedulerConfig) -> Self {
        Self {
            attempts: cfg.steady_retry_attempts.saturating_add(1),
            base_delay: Duration::from_secs(cfg.steady_base_delay_secs),
            max_delay: Duration::from_secs(cfg.steady_max_delay_secs),
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 10)]
    #[case(2, 20)]
    #[case(5, 50)]
    #[case(6, 60)]
    #[case(7, 60)]
    #[case(100, 60)]
    fn test_startup_delays(#[case] attempt: u32, #[case] expected_secs: u64) {
        let policy = RetryPolicy::startup(&SchedulerConfig::default());
        assert_eq!(policy.delay(attempt), Duration::from_secs(expected_secs));
    }

    #[rstest]
    #[case(1, 15)]
    #[case(2, 30)]
    #[case(3, 45)]
    #[case(4, 60)]
    #[case(5, 60)]
    fn test_steady_delays(#[case] attempt: u32, #[case] expected_secs: u64) {
        let policy = RetryPolicy::steady(&SchedulerConfig::default());
        assert_eq!(policy.delay(attempt), Duration::from_secs(expected_secs));
    }

    #[test]
    fn test_attempt_counts() {
        let cfg = SchedulerConfig::default();
        assert_eq!(RetryPolicy::startup(&cfg).attempts, 6);
        assert_eq!(RetryPolicy::steady(&cfg).attempts, 5);

        let no_retries = SchedulerConfig {
            steady_retry_attempts: 0,
            ..SchedulerConfig::default()
        };
        assert_eq!(RetryPolicy::steady(&no_retries).attempts, 1);
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let policy = RetryPolicy {
            attempts: u32::MAX,
            base_delay: Duration::from_secs(u64::MAX / 2),
            max_delay: Duration::from_secs(60),
        };
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(60));
    }
}
