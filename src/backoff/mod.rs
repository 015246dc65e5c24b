//! Exponential backoff policy for reconnection attempts.

use std::time::Duration;

use rand::Rng;

/// Reconnection delay policy.
///
/// Attempt `n` (1-based) waits `base_delay_ms * multiplier^(n-1)`, capped at
/// `max_delay_ms`. Attempts beyond `max_attempts` are refused; the owner can
/// still reconnect manually.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Multiplier for exponential growth.
    pub multiplier: f64,
    /// Maximum delay in milliseconds.
    pub max_delay_ms: u64,
    /// Maximum number of automatic attempts after an unexpected close.
    pub max_attempts: u32,
    /// Jitter factor (0.0 to 1.0). Zero keeps delays exact.
    pub jitter_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            max_attempts: 5,
            jitter_factor: 0.0,
        }
    }
}

impl ReconnectPolicy {
    /// Whether an automatic attempt with this 1-based number may be scheduled.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_attempts
    }

    /// Delay before the given 1-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let base = self.base_delay_ms as f64 * self.multiplier.powi(exponent as i32);
        let capped = base.min(self.max_delay_ms as f64);

        let final_delay = if self.jitter_factor > 0.0 {
            let jitter_range = capped * self.jitter_factor;
            let jitter = rand::rng().random_range(-jitter_range..jitter_range);
            (capped + jitter).max(1.0)
        } else {
            capped.max(1.0)
        };

        Duration::from_millis(final_delay as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            max_attempts: 5,
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn test_first_attempt_uses_base_delay() {
        assert_eq!(policy().delay_for(1), Duration::from_millis(1_000));
    }

    #[test]
    fn test_delays_double_per_attempt() {
        let p = policy();
        assert_eq!(p.delay_for(2), Duration::from_millis(2_000));
        assert_eq!(p.delay_for(3), Duration::from_millis(4_000));
        assert_eq!(p.delay_for(4), Duration::from_millis(8_000));
    }

    #[test]
    fn test_delay_caps_at_max() {
        let p = ReconnectPolicy {
            base_delay_ms: 1_000,
            multiplier: 10.0,
            max_delay_ms: 5_000,
            ..policy()
        };
        assert_eq!(p.delay_for(4), Duration::from_millis(5_000));
    }

    #[test]
    fn test_attempt_bound() {
        let p = policy();
        assert!(!p.allows(0));
        assert!(p.allows(1));
        assert!(p.allows(5));
        assert!(!p.allows(6));
    }

    #[test]
    fn test_jitter_stays_near_target() {
        let p = ReconnectPolicy {
            jitter_factor: 0.1,
            ..policy()
        };
        for _ in 0..50 {
            let d = p.delay_for(1).as_millis() as u64;
            assert!((900..=1_100).contains(&d), "delay {d} outside jitter band");
        }
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let d = policy().delay_for(u32::MAX);
        assert_eq!(d, Duration::from_millis(30_000));
    }
}
