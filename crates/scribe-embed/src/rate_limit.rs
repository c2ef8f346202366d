//! Token-bucket throttle for outbound embedding requests.

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::EmbedError;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket rate limiter.
///
/// Holds at most `burst` tokens and refills at `requests_per_second`. Every
/// request consumes one token; callers wait until one is available.
pub struct RateLimiter {
    max_tokens: f64,
    refill_rate: f64,
    bucket: Mutex<Bucket>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_tokens", &self.max_tokens)
            .field("refill_rate", &self.refill_rate)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// # Errors
    ///
    /// Returns [`EmbedError::Config`] if the rate is not a positive finite number.
    pub fn new(requests_per_second: f64, burst: u32) -> Result<Self, EmbedError> {
        if !requests_per_second.is_finite() || requests_per_second <= 0.0 {
            return Err(EmbedError::Config(format!(
                "requests_per_second must be positive, got {requests_per_second}"
            )));
        }
        let max_tokens = f64::from(burst.max(1));
        Ok(Self {
            max_tokens,
            refill_rate: requests_per_second,
            bucket: Mutex::new(Bucket {
                tokens: max_tokens,
                last_refill: Instant::now(),
            }),
        })
    }

    /// Try to take a token without waiting.
    pub async fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Wait for a token or for cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError::Cancelled`] if `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), EmbedError> {
        loop {
            if cancel.is_cancelled() {
                return Err(EmbedError::Cancelled);
            }
            let wait = {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return Ok(());
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.refill_rate)
            };

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(EmbedError::Cancelled),
                () = tokio::time::sleep(wait) => {}
            }
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.max_tokens);
        bucket.last_refill = now;
    }
}
