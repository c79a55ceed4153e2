//! Minimum-spacing gate for outbound model calls.
//!
//! Behaves like a token bucket with one permit per `interval` and a burst
//! capacity of one: the first caller passes immediately, every later caller
//! is scheduled at least `interval` after the previous grant. Waiters are
//! served in the order they reserved a slot.

use crate::cancel::CancelToken;
use crate::error::Result;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Reserve the next slot and sleep until it arrives.
    pub async fn acquire(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };
        sleep_until(slot).await;
    }

    /// Like [`acquire`](Self::acquire) but gives up when `cancel` fires.
    pub async fn acquire_or_cancel(&self, cancel: &CancelToken) -> Result<()> {
        cancel.run(self.acquire()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test(start_paused = true)]
    async fn test_first_permit_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let t0 = Instant::now();
        limiter.acquire().await;
        assert_eq!(t0.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_grants_are_spaced_by_interval() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let t0 = Instant::now();

        let grants = futures::future::join_all((0..4).map(|_| async {
            limiter.acquire().await;
            t0.elapsed()
        }))
        .await;

        let mut sorted = grants.clone();
        sorted.sort();
        for pair in sorted.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(1));
        }
        assert!(sorted[3] >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_limiter_does_not_accumulate_burst() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        let t0 = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(t0.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        let cancel = CancelToken::new();
        limiter.acquire().await;

        let _timer = cancel.cancel_after(Duration::from_secs(1));
        let res = limiter.acquire_or_cancel(&cancel).await;
        assert!(matches!(res, Err(Error::Cancelled)));
    }
}
