//! Exponential backoff with jitter for webhook delivery retries.
//!
//! Base 1s, factor 2, jitter ±25%, capped at 5 minutes, 10 attempts max —
//! the state machine in `runner` treats attempt 10's failure as terminal
//! (`Retrying → Failed`).

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5 * 60),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before retry attempt `attempt` (1-indexed: the delay that
    /// follows the first failure is `delay_for_attempt(1)`).
    ///
    /// Jitter is a deterministic pseudo-random wobble keyed on the attempt
    /// number rather than a random-number generator — two calls with the
    /// same attempt always agree, which keeps retry timing reproducible in
    /// tests without needing to inject a RNG.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let exp = 2_f64.powi((attempt - 1) as i32);
        let delay_ms = (base_ms * exp).min(max_ms);

        let jitter_range = delay_ms * self.jitter;
        let pseudo_random = ((attempt as f64 * 17.0) % 100.0) / 100.0;
        let jitter = jitter_range * (pseudo_random - 0.5) * 2.0;

        Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5 * 60),
            jitter: 0.0,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(9), Duration::from_secs(5 * 60));
    }

    #[test]
    fn jitter_stays_within_the_configured_band() {
        let policy = RetryPolicy::default();
        for attempt in 1..=policy.max_attempts {
            let base = policy.base_delay.as_millis() as f64 * 2_f64.powi((attempt - 1) as i32);
            let base = base.min(policy.max_delay.as_millis() as f64);
            let got = policy.delay_for_attempt(attempt).as_millis() as f64;
            assert!(got >= base * (1.0 - policy.jitter) - 1.0, "attempt {attempt}: {got} below band");
            assert!(got <= base * (1.0 + policy.jitter) + 1.0, "attempt {attempt}: {got} above band");
        }
    }

    #[test]
    fn should_retry_stops_at_max_attempts() {
        let policy = RetryPolicy { max_attempts: 3, ..RetryPolicy::default() };
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }
}
