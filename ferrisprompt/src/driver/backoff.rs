//! Poll delays for waiting on background operations.

use std::time::Duration;

use rand::Rng;

use crate::error::{DriverError, Result};

/// Backoff parameters for the suspendable wait.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollConfig {
    /// First delay, and the upper bound of the jitter added to every delay.
    pub min: Duration,

    /// Cap on the deterministic part of the delay.
    pub max: Duration,

    /// Growth per poll.
    pub backoff_factor: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(5),
            max: Duration::from_millis(200),
            backoff_factor: 2.0,
        }
    }
}

impl PollConfig {
    /// Check the parameters describe a non-shrinking, bounded sequence.
    pub fn validate(&self) -> Result<()> {
        if self.min.is_zero() || self.max < self.min {
            return Err(DriverError::InvalidOptions {
                message: format!(
                    "poll delays need 0 < min <= max, got min={:?} max={:?}",
                    self.min, self.max
                ),
            }
            .into());
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(DriverError::InvalidOptions {
                message: format!("backoff factor must be >= 1, got {}", self.backoff_factor),
            }
            .into());
        }
        Ok(())
    }
}

/// Endless sequence of poll delays: exponential growth, capped, plus jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: PollConfig,
    base: Duration,
}

impl Backoff {
    pub fn new(config: PollConfig) -> Self {
        Self {
            base: config.min,
            config,
        }
    }

    /// Advance and return the deterministic part of the next delay.
    pub fn next_base(&mut self) -> Duration {
        let current = self.base;
        let grown = (current.as_nanos() as f64 * self.config.backoff_factor).round();
        self.base = Duration::from_nanos(grown.min(u64::MAX as f64) as u64).min(self.config.max);
        current
    }

    fn jitter(&self) -> Duration {
        let bound = u64::try_from(self.config.min.as_nanos()).unwrap_or(u64::MAX);
        Duration::from_nanos(rand::rng().random_range(0..=bound))
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let base = self.next_base();
        Some(base + self.jitter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PollConfig {
        PollConfig {
            min: Duration::from_millis(10),
            max: Duration::from_millis(200),
            backoff_factor: 2.0,
        }
    }

    #[test]
    fn test_base_sequence() {
        let mut backoff = Backoff::new(config());
        let bases: Vec<u64> = (0..8).map(|_| backoff.next_base().as_millis() as u64).collect();
        assert_eq!(bases, vec![10, 20, 40, 80, 160, 200, 200, 200]);
    }

    #[test]
    fn test_delays_bounded() {
        let cfg = config();
        let bound = cfg.max + cfg.min;
        for delay in Backoff::new(cfg).take(200) {
            assert!(delay <= bound, "{:?} exceeds {:?}", delay, bound);
            assert!(delay >= cfg.min);
        }
    }

    #[test]
    fn test_base_non_decreasing() {
        let mut backoff = Backoff::new(PollConfig {
            backoff_factor: 1.3,
            ..config()
        });
        let mut previous = Duration::ZERO;
        for _ in 0..50 {
            let base = backoff.next_base();
            assert!(base >= previous);
            previous = base;
        }
        assert_eq!(previous, Duration::from_millis(200));
    }

    #[test]
    fn test_validate() {
        assert!(config().validate().is_ok());
        assert!(PollConfig { min: Duration::ZERO, ..config() }.validate().is_err());
        assert!(PollConfig { max: Duration::from_millis(1), ..config() }.validate().is_err());
        assert!(PollConfig { backoff_factor: 0.5, ..config() }.validate().is_err());
    }
}
