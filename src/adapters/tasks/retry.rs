//! Backoff schedule for background provisioning attempts.

use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;

/// Attempt budget and delay growth for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards.
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(30 * 60),
        }
    }
}

impl RetryPolicy {
    /// A single attempt with no waiting.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delays between attempts: `initial, 2*initial, 4*initial, ...` capped
    /// at `max_delay`, one fewer than `max_attempts`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        // ExponentialBackoff yields base^n * factor: with base 2 the first
        // delay is 2 * factor, so factor is half the initial delay.
        let initial_ms = self.initial_delay.as_millis().min(u128::from(u64::MAX)) as u64;
        ExponentialBackoff::from_millis(2)
            .factor((initial_ms / 2).max(1))
            .max_delay(self.max_delay)
            .take(self.max_attempts.saturating_sub(1) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_doubles_from_sixty_seconds() {
        let delays: Vec<_> = RetryPolicy::default().delays().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(60),
                Duration::from_secs(120),
                Duration::from_secs(240),
                Duration::from_secs(480),
            ]
        );
    }

    #[test]
    fn delays_are_capped() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(90),
        };
        let delays: Vec<_> = policy.delays().collect();
        assert_eq!(delays[1], Duration::from_secs(90));
        assert_eq!(delays[2], Duration::from_secs(90));
    }

    #[test]
    fn single_attempt_has_no_delays() {
        assert_eq!(RetryPolicy::once().delays().count(), 0);
    }
}
