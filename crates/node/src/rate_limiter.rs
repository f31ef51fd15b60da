//! Token bucket limiting outbound ledger status updates.
//!
//! Time is passed in by the caller so the responder stays deterministic.

use std::time::Instant;

/// Token bucket refilled continuously at `rate` tokens per second, holding
/// at most one second worth of tokens.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    /// Current number of tokens available.
    tokens: f64,
    /// Maximum tokens (bucket capacity).
    capacity: f64,
    /// Tokens added per second.
    refill_rate: f64,
    /// Last time we updated the bucket.
    last_update: Instant,
}

impl TokenBucket {
    /// A full bucket allowing `rate` sends per second.
    ///
    /// Rates below one still allow a single send per refill.
    pub fn new(rate: f64, now: Instant) -> Self {
        let refill_rate = rate.max(0.0);
        let capacity = refill_rate.max(1.0);
        Self {
            tokens: capacity,
            capacity,
            refill_rate,
            last_update: now,
        }
    }

    /// Try to consume one token. Returns true if allowed, false if rate limited.
    pub fn try_consume(&mut self, now: Instant) -> bool {
        // Refill tokens based on elapsed time
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_update = self.last_update.max(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens currently available, without refilling.
    pub fn available(&self) -> f64 {
        self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_burst_then_limit() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(3.0, start);

        for _ in 0..3 {
            assert!(bucket.try_consume(start), "Should allow burst");
        }
        assert!(!bucket.try_consume(start), "Should rate limit after burst");
    }

    #[test]
    fn test_token_refill() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(10.0, start);
        for _ in 0..10 {
            bucket.try_consume(start);
        }
        assert!(!bucket.try_consume(start));

        // 10/sec = 100ms per token
        assert!(bucket.try_consume(start + Duration::from_millis(100)));
        assert!(!bucket.try_consume(start + Duration::from_millis(150)));
    }

    #[test]
    fn test_refill_is_capped() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(2.0, start);
        bucket.try_consume(start);

        let later = start + Duration::from_secs(60);
        assert!(bucket.try_consume(later));
        assert!(bucket.try_consume(later));
        assert!(!bucket.try_consume(later));
    }

    #[test]
    fn test_time_going_backwards_does_not_refill() {
        let start = Instant::now() + Duration::from_secs(1);
        let mut bucket = TokenBucket::new(1.0, start);
        assert!(bucket.try_consume(start));
        assert!(!bucket.try_consume(start - Duration::from_millis(500)));
        assert!(bucket.available() < 1.0);
    }
}
