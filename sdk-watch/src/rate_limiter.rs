//! Token bucket used to bound flush frequency.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Non-blocking token bucket.
///
/// Refills one token per `interval` up to `burst` tokens and starts full.
/// A `burst` of zero never grants a token; a zero `interval` always does.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    burst: u32,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

impl RateLimiter {
    /// Create a limiter allowing `burst` acquisitions per `interval`.
    #[must_use]
    pub fn new(interval: Duration, burst: u32) -> Self {
        Self {
            interval,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(burst),
                refilled_at: Instant::now(),
            }),
        }
    }

    /// Take a token if one is available.
    pub fn try_acquire(&self) -> bool {
        if self.burst == 0 {
            return false;
        }
        if self.interval.is_zero() {
            return true;
        }

        let mut bucket = self.bucket.lock();
        let now = Instant::now();
        let earned = now.duration_since(bucket.refilled_at).as_secs_f64() / self.interval.as_secs_f64();
        bucket.tokens = (bucket.tokens + earned).min(f64::from(self.burst));
        bucket.refilled_at = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Refill interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Bucket capacity.
    #[must_use]
    pub const fn burst(&self) -> u32 {
        self.burst
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_starts_full_then_refills() {
        let limiter = RateLimiter::new(Duration::from_millis(100), 2);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_capped_at_burst() {
        let limiter = RateLimiter::new(Duration::from_millis(10), 3);
        tokio::time::advance(Duration::from_secs(10)).await;
        let granted = (0..10).filter(|_| limiter.try_acquire()).count();
        assert_eq!(granted, 3);
    }

    #[test]
    fn test_zero_burst_never_grants() {
        let limiter = RateLimiter::new(Duration::from_millis(1), 0);
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_zero_interval_always_grants() {
        let limiter = RateLimiter::new(Duration::ZERO, 1);
        assert!((0..100).all(|_| limiter.try_acquire()));
    }
}
