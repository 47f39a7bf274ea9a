//! Exponential backoff with jitter for transient transport failures.
//!
//! Rate-limit responses are handled separately by the client: their wait is
//! recomputed from the refill rate and they never consume a retry attempt.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first call
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Delay before retry `attempt` (1-based): base * 2^(attempt-1), capped,
    /// with +-25% jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        Duration::from_secs_f64(exp.as_secs_f64() * jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_within_jitter() {
        let policy = RetryPolicy::default();
        for attempt in 1..=3 {
            let expected = 0.5 * 2f64.powi(attempt as i32 - 1);
            let delay = policy.backoff_delay(attempt).as_secs_f64();
            assert!(delay >= expected * 0.75 && delay <= expected * 1.25,
                "attempt {attempt}: delay {delay} outside [{}, {}]",
                expected * 0.75, expected * 1.25);
        }
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::default();
        let delay = policy.backoff_delay(30);
        assert!(delay <= Duration::from_secs_f64(15.0 * 1.25));
    }
}
