//! Fixed-window rate limiter, keyed by `"key:<token>"` or `"ip:<host>"`.
//!
//! A fixed window (not sliding) is deliberate: the window resets on a
//! wall-clock boundary rather than tracking individual timestamps, which
//! is the cheaper and simpler shape the spec calls for — this process is
//! a single instance, not a distributed rate limiter.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Window {
    started_at: Instant,
    count: u32,
}

pub struct RateLimiter {
    limit: u32,
    window: Duration,
    buckets: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(limit_per_minute: u32) -> Self {
        Self {
            limit: limit_per_minute,
            window: Duration::from_secs(60),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Records one request under `key`. Returns `true` if it falls
    /// within the limit for the current window, `false` if the window
    /// is already exhausted.
    pub fn allow(&self, key: &str) -> bool {
        let mut buckets = self.buckets.lock().expect("rate limiter poisoned");
        let now = Instant::now();
        let entry = buckets.entry(key.to_owned()).or_insert(Window {
            started_at: now,
            count: 0,
        });
        if now.duration_since(entry.started_at) >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }
        if entry.count >= self.limit {
            return false;
        }
        entry.count += 1;
        true
    }
}
