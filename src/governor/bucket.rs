//! Proactive token bucket shared by concurrent reconciles
//!
//! Implemented as a virtual scheduling clock: every granted token pushes the
//! theoretical arrival time forward by one emission interval, and a request is
//! admitted while that time stays within `burst - 1` intervals of now. This
//! admits `burst` requests at once and `rate` per second sustained.
//!
//! # Thread Safety
//!
//! State lives behind a `Mutex` that is never held across an await point.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Fixed-rate limiter with a burst allowance
#[derive(Debug)]
pub struct TokenBucket {
    emission_interval: Duration,
    tolerance: Duration,
    next_arrival: Mutex<Instant>,
}

impl TokenBucket {
    /// `per_second` sustained tokens with room for `burst` back-to-back tokens
    pub fn new(per_second: u32, burst: u32) -> Self {
        let emission_interval = Duration::from_secs(1) / per_second.max(1);
        Self {
            emission_interval,
            tolerance: emission_interval * burst.max(1).saturating_sub(1),
            next_arrival: Mutex::new(Instant::now()),
        }
    }

    /// Take a token now, or learn how long to wait before trying again
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut next_arrival = self
            .next_arrival
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let arrival = (*next_arrival).max(now);
        let ahead = arrival - now;
        if ahead > self.tolerance {
            return Err(ahead - self.tolerance);
        }
        *next_arrival = arrival + self.emission_interval;
        Ok(())
    }

    /// Wait for a token, giving up when `cancel` fires first
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(wait) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_granted_immediately() {
        let bucket = TokenBucket::new(1, 10);
        for _ in 0..10 {
            assert!(bucket.try_acquire().is_ok());
        }
        assert_eq!(bucket.try_acquire(), Err(Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_refill() {
        let bucket = TokenBucket::new(1, 10);
        let cancel = CancellationToken::new();
        let start = Instant::now();
        for _ in 0..10 {
            bucket.acquire(&cancel).await.unwrap();
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        bucket.acquire(&cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_respect_sustained_rate() {
        let bucket = Arc::new(TokenBucket::new(1, 10));
        let start = Instant::now();
        let handles: Vec<_> = (0..15)
            .map(|_| {
                let bucket = bucket.clone();
                tokio::spawn(async move {
                    bucket.acquire(&CancellationToken::new()).await.unwrap();
                    Instant::now()
                })
            })
            .collect();

        let mut granted = Vec::new();
        for handle in handles {
            granted.push(handle.await.unwrap() - start);
        }
        granted.sort();

        // 10 from the burst, the remaining 5 at one per second
        assert!(granted[9] < Duration::from_secs(1));
        assert!(granted[14] >= Duration::from_secs(5));
        for window_start in 1..10u64 {
            let from = Duration::from_secs(window_start);
            let to = from + Duration::from_secs(1);
            let in_window = granted.iter().filter(|t| **t >= from && **t < to).count();
            assert!(in_window <= 1, "{} grants in window {:?}", in_window, from);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_returns_error() {
        let bucket = TokenBucket::new(1, 1);
        let cancel = CancellationToken::new();
        bucket.acquire(&cancel).await.unwrap();

        cancel.cancel();
        assert!(matches!(bucket.acquire(&cancel).await, Err(Error::Cancelled)));
    }
}
