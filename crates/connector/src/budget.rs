//! Leaky-bucket call budget.
//!
//! Local accounting drifts between responses; every response carries the
//! remote's authoritative `tokensLeft` and `refillPerMinute`, and
//! [`TokenBudget::synchronize`] snaps the local state back to remote truth.

use nicheradar_core::{Error, Result};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct BudgetState {
    balance: f64,
    capacity: f64,
    refill_per_minute: f64,
    last_refill: Instant,
}

impl BudgetState {
    /// Credits tokens accrued since the last refill, capped at capacity.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.balance = (self.balance + self.refill_per_minute * elapsed / 60.0).min(self.capacity);
        self.last_refill = now;
    }

    /// Minimum sleep until `cost` tokens are available, or `None` when the
    /// balance already covers the call.
    fn wait_needed(&self, cost: f64) -> Option<Duration> {
        if self.balance >= cost {
            return None;
        }
        if self.refill_per_minute <= 0.0 {
            return Some(Duration::MAX);
        }
        let missing = cost - self.balance;
        Some(Duration::from_secs_f64(missing / self.refill_per_minute * 60.0))
    }
}

/// Shared token budget guarding all external calls. Concurrent callers
/// serialize on the internal mutex; the waiting sleep happens outside the
/// lock so one blocked caller never starves another's synchronize.
pub struct TokenBudget {
    state: Mutex<BudgetState>,
}

impl TokenBudget {
    pub fn new(capacity: u32, refill_per_minute: f64) -> Self {
        Self {
            state: Mutex::new(BudgetState {
                balance: capacity as f64,
                capacity: capacity as f64,
                refill_per_minute,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Blocks until the balance covers `cost`, then deducts it. Fails with
    /// a budget error when the wait would exceed `max_wait`.
    pub async fn acquire(&self, cost: f64, max_wait: Duration) -> Result<()> {
        let deadline = Instant::now() + max_wait;
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                state.refill(Instant::now());
                match state.wait_needed(cost) {
                    None => {
                        state.balance -= cost;
                        return Ok(());
                    }
                    Some(wait) => wait,
                }
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            if wait > remaining {
                return Err(Error::budget(format!(
                    "token bucket exhausted: {cost} units needed, refill would take {:.1}s",
                    wait.as_secs_f64()
                )));
            }
            debug!(wait_secs = wait.as_secs_f64(), cost, "waiting for token refill");
            tokio::time::sleep(wait).await;
        }
    }

    /// Snaps local accounting to the remote's authoritative values.
    pub async fn synchronize(&self, tokens_left: Option<f64>, refill_per_minute: Option<f64>) {
        let mut state = self.state.lock().await;
        if let Some(left) = tokens_left {
            state.balance = left.min(state.capacity);
            state.last_refill = Instant::now();
        }
        if let Some(rate) = refill_per_minute {
            if rate > 0.0 {
                state.refill_per_minute = rate;
            }
        }
    }

    pub async fn balance(&self) -> f64 {
        let mut state = self.state.lock().await;
        state.refill(Instant::now());
        state.balance
    }

    pub async fn refill_per_minute(&self) -> f64 {
        self.state.lock().await.refill_per_minute
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(balance: f64, capacity: f64, rate: f64) -> BudgetState {
        BudgetState {
            balance,
            capacity,
            refill_per_minute: rate,
            last_refill: Instant::now(),
        }
    }

    #[test]
    fn refill_accrues_and_caps_at_capacity() {
        let mut s = state(10.0, 200.0, 60.0);
        let later = s.last_refill + Duration::from_secs(30);
        s.refill(later);
        assert!((s.balance - 40.0).abs() < 1e-9);

        let much_later = s.last_refill + Duration::from_secs(3600);
        s.refill(much_later);
        assert_eq!(s.balance, 200.0);
    }

    #[test]
    fn wait_is_derived_from_refill_rate() {
        let s = state(5.0, 200.0, 21.0);
        let wait = s.wait_needed(26.0).unwrap();
        // 21 tokens missing at 21/minute is one minute
        assert!((wait.as_secs_f64() - 60.0).abs() < 1e-6);
        assert!(s.wait_needed(5.0).is_none());
    }

    #[tokio::test]
    async fn acquire_deducts_when_funded() {
        let budget = TokenBudget::new(200, 21.0);
        budget.acquire(2.0, Duration::from_secs(1)).await.unwrap();
        assert!(budget.balance().await <= 198.0 + 1e-6);
    }

    #[tokio::test]
    async fn acquire_fails_past_deadline() {
        let budget = TokenBudget::new(10, 1.0);
        // Drain the bucket, then ask for more than a short deadline allows.
        budget.acquire(10.0, Duration::from_secs(1)).await.unwrap();
        let err = budget
            .acquire(5.0, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err.kind, nicheradar_core::ErrorKind::Budget);
    }

    #[tokio::test]
    async fn synchronize_adopts_remote_truth() {
        let budget = TokenBudget::new(200, 21.0);
        budget.synchronize(Some(42.0), Some(30.0)).await;
        assert!((budget.balance().await - 42.0).abs() < 1.0);
        assert_eq!(budget.refill_per_minute().await, 30.0);
    }

    #[tokio::test]
    async fn synchronize_ignores_nonsense_rate() {
        let budget = TokenBudget::new(200, 21.0);
        budget.synchronize(None, Some(0.0)).await;
        assert_eq!(budget.refill_per_minute().await, 21.0);
    }
}
