//! Reconnect delay policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff settings for automatic reconnection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// First delay after a failed attempt
    #[serde(with = "crate::config::secs")]
    pub initial_backoff: Duration,
    /// Upper bound for the delay before jitter
    #[serde(with = "crate::config::secs")]
    pub max_backoff: Duration,
    /// Fraction of the delay added as random jitter, 0.0 to 1.0 (0.0 disables)
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

/// Delay sequence for one run of reconnect attempts
///
/// Yields `initial, 2*initial, 4*initial, ...` capped at `max_backoff`, each
/// plus `capped * jitter * random()`.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    delay: Duration,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            delay: policy.initial_backoff,
        }
    }

    /// Next sleep duration. `random` must return a value in `[0, 1)`.
    pub fn next_delay(&mut self, random: f64) -> Duration {
        let capped = self.delay.min(self.policy.max_backoff);
        let factor = (self.policy.jitter * random).max(0.0);
        let jitter = Duration::try_from_secs_f64(capped.as_secs_f64() * factor)
            .unwrap_or(self.policy.max_backoff);
        self.delay = capped
            .saturating_mul(2)
            .max(self.policy.initial_backoff)
            .min(self.policy.max_backoff);
        capped.saturating_add(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(initial: u64, max: u64, jitter: f64) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_backoff: Duration::from_secs(initial),
            max_backoff: Duration::from_secs(max),
            jitter,
        }
    }

    #[test]
    fn doubles_until_capped() {
        let mut backoff = Backoff::new(policy(1, 5, 0.0));
        let delays: Vec<u64> = (0..5).map(|_| backoff.next_delay(0.5).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
    }

    #[test]
    fn jitter_scales_capped_delay() {
        let mut backoff = Backoff::new(policy(2, 30, 0.5));
        assert_eq!(backoff.next_delay(1.0), Duration::from_secs(3));
        assert_eq!(backoff.next_delay(0.0), Duration::from_secs(4));
    }

    #[test]
    fn oversized_jitter_saturates() {
        let mut backoff = Backoff::new(policy(1, 30, 1e300));
        assert_eq!(backoff.next_delay(0.5), Duration::from_secs(31));

        let mut backoff = Backoff::new(policy(1, 30, f64::INFINITY));
        assert_eq!(backoff.next_delay(0.5), Duration::from_secs(31));
    }

    #[test]
    fn initial_above_max_is_capped() {
        let mut backoff = Backoff::new(policy(60, 30, 0.0));
        assert_eq!(backoff.next_delay(0.0), Duration::from_secs(30));
        assert_eq!(backoff.next_delay(0.0), Duration::from_secs(30));
    }

    #[test]
    fn defaults() {
        let p = ReconnectPolicy::default();
        assert_eq!(p.initial_backoff, Duration::from_secs(1));
        assert_eq!(p.max_backoff, Duration::from_secs(30));
        assert_eq!(p.jitter, 0.2);
    }
}
