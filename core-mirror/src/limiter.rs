//! # API Rate Limiter
//!
//! Dual token-bucket throttle in front of every remote call.
//!
//! ## Overview
//!
//! Remote stores enforce two ceilings at once: a per-second cap that smooths
//! sustained throughput and a per-minute cap on aggregate volume. The
//! limiter models both as token buckets behind a single mutex and only
//! grants a request when *both* buckets can supply the requested units, in
//! which case it deducts from both in the same critical section. A wait can
//! never drain one bucket while leaving the other untouched, and a
//! cancelled wait consumes nothing.
//!
//! Every remote call in the engine (listing, metadata, content, asset
//! download) passes through one shared instance, so the ceilings hold
//! across all concurrent document tasks.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::config::RateLimits;
use crate::error::{MirrorError, Result};

/// One token bucket: capacity `burst`, refilling at `rate` tokens/second.
#[derive(Debug)]
struct Bucket {
    rate: f64,
    burst: f64,
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(rate: f64, burst: u32, now: Instant) -> Self {
        Self {
            rate,
            burst: f64::from(burst),
            tokens: f64::from(burst),
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.rate).min(self.burst);
        self.last_refill = now;
    }

    /// How long until `n` tokens are available, zero if they already are.
    fn shortfall_delay(&self, n: f64) -> Duration {
        if self.tokens >= n {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((n - self.tokens) / self.rate)
        }
    }
}

/// Dual token-bucket rate limiter.
///
/// Cheap to share: interior mutability behind one mutex, all methods take
/// `&self`.
#[derive(Debug)]
pub struct ApiRateLimiter {
    buckets: Mutex<(Bucket, Bucket)>,
    max_units: u32,
}

impl ApiRateLimiter {
    /// Creates a limiter from configured ceilings.
    pub fn new(limits: RateLimits) -> Self {
        let now = Instant::now();
        let short = Bucket::new(limits.per_second, limits.second_burst, now);
        let long = Bucket::new(limits.per_minute / 60.0, limits.minute_burst, now);
        Self {
            buckets: Mutex::new((short, long)),
            max_units: limits.second_burst.min(limits.minute_burst),
        }
    }

    /// Waits until one unit is available in both buckets, then consumes it.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError::Cancelled` if `cancel` fires mid-wait; no
    /// tokens are consumed in that case.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        self.wait_n(1, cancel).await
    }

    /// Waits until `n` units are available in both buckets, then consumes
    /// them atomically.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError::InvalidInput` when `n` exceeds the smaller
    /// burst capacity (the request could never be satisfied), and
    /// `MirrorError::Cancelled` if `cancel` fires mid-wait.
    pub async fn wait_n(&self, n: u32, cancel: &CancellationToken) -> Result<()> {
        if n > self.max_units {
            return Err(MirrorError::invalid_input(
                "n",
                format!("{} units exceed the burst capacity {}", n, self.max_units),
            ));
        }

        if cancel.is_cancelled() {
            return Err(MirrorError::Cancelled);
        }

        loop {
            let delay = match self.acquire_or_delay(f64::from(n)) {
                None => return Ok(()),
                Some(delay) => delay,
            };

            trace!(delay_ms = delay.as_millis() as u64, "rate limit reached");

            tokio::select! {
                _ = cancel.cancelled() => return Err(MirrorError::Cancelled),
                _ = sleep(delay) => {}
            }
        }
    }

    /// Consumes one unit from both buckets if immediately available.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_n(1)
    }

    /// Consumes `n` units from both buckets if immediately available.
    /// Never deducts from only one.
    pub fn try_acquire_n(&self, n: u32) -> bool {
        n <= self.max_units && self.acquire_or_delay(f64::from(n)).is_none()
    }

    /// Refills both buckets and either deducts `n` from both (returning
    /// `None`) or returns the delay after which the scarcer bucket should
    /// have caught up. Deduction is all-or-nothing by construction: it
    /// happens in the same critical section as both availability checks.
    fn acquire_or_delay(&self, n: f64) -> Option<Duration> {
        let mut guard = match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let (short, long) = &mut *guard;

        let now = Instant::now();
        short.refill(now);
        long.refill(now);

        let delay = short.shortfall_delay(n).max(long.shortfall_delay(n));
        if delay.is_zero() {
            short.tokens -= n;
            long.tokens -= n;
            None
        } else {
            Some(delay)
        }
    }
}

impl Default for ApiRateLimiter {
    fn default() -> Self {
        Self::new(RateLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::advance;

    fn limits(per_second: f64, second_burst: u32, per_minute: f64, minute_burst: u32) -> RateLimits {
        RateLimits {
            per_second,
            second_burst,
            per_minute,
            minute_burst,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_throttle() {
        let limiter = ApiRateLimiter::new(limits(5.0, 5, 300.0, 10));
        let cancel = CancellationToken::new();

        // Full burst goes through without waiting.
        for _ in 0..5 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());

        // The sixth unit needs a refill; with the clock paused the wait
        // completes only after time is advanced.
        let start = Instant::now();
        limiter.wait(&cancel).await.unwrap();
        assert!(Instant::now() - start >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_window_gates_even_when_short_is_full() {
        // Short bucket generous, long bucket tiny: after the long burst is
        // spent the long window is what the caller waits on.
        let limiter = ApiRateLimiter::new(limits(1000.0, 1000, 60.0, 2));
        let cancel = CancellationToken::new();

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        let start = Instant::now();
        limiter.wait(&cancel).await.unwrap();
        // 60/min refills one token per second.
        assert!(Instant::now() - start >= Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_atomic_deduction_when_one_bucket_is_short() {
        // Short bucket refills very slowly so a wrongly deducted token
        // would not come back within this test.
        let limiter = ApiRateLimiter::new(limits(0.1, 5, 120.0, 3));
        let cancel = CancellationToken::new();

        // Drain the long bucket. The short bucket still has 2 tokens but a
        // grab of 2 must fail entirely, leaving the short bucket untouched.
        assert!(limiter.try_acquire_n(3));
        assert!(!limiter.try_acquire_n(2));

        // After the long bucket refills 2 tokens the same grab succeeds
        // without further waiting, which it only can if the earlier failure
        // consumed nothing from the short bucket.
        advance(Duration::from_secs(1)).await;
        let start = Instant::now();
        limiter.wait_n(2, &cancel).await.unwrap();
        assert!(Instant::now() - start < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_wait_consumes_nothing() {
        let limiter = Arc::new(ApiRateLimiter::new(limits(1.0, 1, 60.0, 1)));
        let cancel = CancellationToken::new();

        assert!(limiter.try_acquire());

        let waiter = {
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.wait(&cancel).await })
        };
        tokio::task::yield_now().await;
        cancel.cancel();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(MirrorError::Cancelled)));

        // One full refill later exactly one token is available, so the
        // cancelled wait cannot have deducted anything.
        advance(Duration::from_secs(1)).await;
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test]
    async fn test_oversized_request_rejected() {
        let limiter = ApiRateLimiter::new(limits(5.0, 5, 100.0, 10));
        let cancel = CancellationToken::new();

        let result = limiter.wait_n(6, &cancel).await;
        assert!(matches!(result, Err(MirrorError::InvalidInput { .. })));
        assert!(!limiter.try_acquire_n(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_defaults_match_documented_ceilings() {
        let limiter = ApiRateLimiter::default();

        for _ in 0..5 {
            assert!(limiter.try_acquire());
        }
        // Short burst exhausted.
        assert!(!limiter.try_acquire());

        // After a second the short bucket refills 5, and the long bucket
        // (100/min, burst 10) still has headroom for all of them.
        advance(Duration::from_secs(1)).await;
        for _ in 0..5 {
            assert!(limiter.try_acquire());
        }
        // Both bucket ceilings gate the eleventh request.
        assert!(!limiter.try_acquire());
    }
}
