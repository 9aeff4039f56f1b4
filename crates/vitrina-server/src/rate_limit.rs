//! Fixed-window in-memory rate limiting

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Hard cap on tracked buckets. Keys derive from caller-supplied
/// identifiers, so the map must not grow without bound.
const MAX_BUCKETS: usize = 10_000;

#[derive(Debug)]
struct RateBucket {
    count: u32,
    reset_at: Instant,
}

/// Shared fixed-window limiter. A single mutex guards the whole map and the
/// critical section never performs I/O; expired buckets are swept inline
/// under the same lock once the map outgrows [`MAX_BUCKETS`].
///
/// Constructed once and carried in application state.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, RateBucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic check-and-increment for `key`. Returns
    /// `(permitted, retry_after_secs)`; the retry hint is zero when
    /// permitted and at least one second otherwise.
    pub fn allow(&self, key: &str, max_requests: u32, window: Duration) -> (bool, u64) {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().expect("rate limiter lock");

        let bucket = buckets.entry(key.to_string()).or_insert(RateBucket {
            count: 0,
            reset_at: now + window,
        });
        if now >= bucket.reset_at {
            bucket.count = 0;
            bucket.reset_at = now + window;
        }

        if bucket.count >= max_requests {
            let retry_after = bucket.reset_at.saturating_duration_since(now).as_secs().max(1);
            return (false, retry_after);
        }
        bucket.count += 1;

        if buckets.len() > MAX_BUCKETS {
            buckets.retain(|_, bucket| now < bucket.reset_at);
        }

        (true, 0)
    }

    #[cfg(test)]
    fn bucket_count(&self) -> usize {
        self.buckets.lock().expect("rate limiter lock").len()
    }
}

/// Rate-limit key: endpoint scope plus the caller's tracking identity, so
/// limits for different endpoint classes never cross-contaminate.
pub fn composite_key(
    scope: &str,
    client_ip: &str,
    visitor_id: Option<&str>,
    session_id: &str,
) -> String {
    format!(
        "{scope}:{client_ip}:{}:{session_id}",
        visitor_id.unwrap_or("na")
    )
}
