use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Status polling schedule for video jobs: bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub base_interval_ms: u64,
    pub multiplier: f64,
    pub max_interval_ms: u64,
    /// Status checks before a job is declared timed out.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: 5_000,
            multiplier: 1.5,
            max_interval_ms: 15_000,
            max_attempts: 120,
        }
    }
}

impl PollConfig {
    /// Delay after the `attempt`-th status check (0-based):
    /// `min(base * multiplier^attempt, max)`.
    pub fn interval(&self, attempt: u32) -> Duration {
        // 0 * inf is NaN, which `min` would turn into the cap.
        if self.base_interval_ms == 0 {
            return Duration::ZERO;
        }
        let multiplier = if self.multiplier.is_finite() && self.multiplier >= 1.0 {
            self.multiplier
        } else {
            1.0
        };
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let raw = self.base_interval_ms as f64 * multiplier.powi(exponent);
        let ms = raw.min(self.max_interval_ms as f64);
        Duration::from_millis(ms as u64)
    }

    /// Longest time a job can be waited on before timing out.
    pub fn worst_case_wait(&self) -> Duration {
        let waits = self.max_attempts.saturating_sub(1);
        let cap = Duration::from_millis(self.max_interval_ms);
        let mut total = Duration::ZERO;
        for attempt in 0..waits {
            let delay = self.interval(attempt);
            if delay >= cap {
                return total + cap * (waits - attempt);
            }
            total += delay;
        }
        total
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("polling.max_attempts must be at least 1".into());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!(
                "polling.multiplier must be >= 1.0 (got {})",
                self.multiplier
            ));
        }
        if self.max_interval_ms < self.base_interval_ms {
            return Err("polling.max_interval_ms must not be below base_interval_ms".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_base_never_waits() {
        let cfg = PollConfig {
            base_interval_ms: 0,
            multiplier: 2.0,
            max_interval_ms: 1000,
            max_attempts: 3000,
        };
        assert_eq!(cfg.interval(0), Duration::ZERO);
        assert_eq!(cfg.interval(2000), Duration::ZERO);
        assert_eq!(cfg.worst_case_wait(), Duration::ZERO);
    }

    #[test]
    fn grows_then_caps() {
        let cfg = PollConfig {
            base_interval_ms: 1000,
            multiplier: 2.0,
            max_interval_ms: 5000,
            max_attempts: 10,
        };
        let ms: Vec<u128> = (0..5).map(|a| cfg.interval(a).as_millis()).collect();
        assert_eq!(ms, vec![1000, 2000, 4000, 5000, 5000]);
        assert_eq!(cfg.interval(u32::MAX).as_millis(), 5000);
    }

    #[test]
    fn defaults_match_service_guidance() {
        let cfg = PollConfig::default();
        assert_eq!(cfg.interval(0), Duration::from_secs(5));
        assert_eq!(cfg.interval(1), Duration::from_millis(7500));
        assert_eq!(cfg.interval(3), Duration::from_secs(15));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn shrinking_multiplier_is_treated_as_constant() {
        let cfg = PollConfig {
            base_interval_ms: 300,
            multiplier: 0.5,
            max_interval_ms: 1000,
            max_attempts: 3,
        };
        assert_eq!(cfg.interval(4).as_millis(), 300);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn worst_case_wait_skips_sleep_after_last_check() {
        let cfg = PollConfig {
            base_interval_ms: 10,
            multiplier: 1.0,
            max_interval_ms: 10,
            max_attempts: 4,
        };
        assert_eq!(cfg.worst_case_wait(), Duration::from_millis(30));
    }

    #[test]
    fn validation_rejects_zero_attempts() {
        let cfg = PollConfig {
            max_attempts: 0,
            ..PollConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
