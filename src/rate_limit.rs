//! Sliding-window rate limiting, shared by the HTTP room-creation endpoint
//! and the WebSocket session's cursor-move throttle.

use std::collections::HashMap;
use std::env;
use std::sync::Mutex;
use std::time::Instant;

/// Configurable rate limit values, read from environment variables.
///
/// - `RATE_LIMIT_ROOMS` — max room creations per hour per IP (default: 10)
/// - `RATE_LIMIT_CURSOR` — max cursor-move frames per second per connection (default: 20)
pub struct RateLimitConfig {
    pub rooms_max: usize,
    pub rooms_window_secs: u64,
    pub cursor_max: usize,
    pub cursor_window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rooms_max: 10,
            rooms_window_secs: 3600,
            cursor_max: 20,
            cursor_window_secs: 1,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("RATE_LIMIT_ROOMS")
            && let Ok(n) = val.parse::<usize>()
        {
            config.rooms_max = n;
        }
        if let Ok(val) = env::var("RATE_LIMIT_CURSOR")
            && let Ok(n) = val.parse::<usize>()
        {
            config.cursor_max = n;
        }

        config
    }
}

/// Information about rate limit status for a given key.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    pub allowed: bool,
    pub limit: usize,
    pub remaining: usize,
    /// Seconds until the oldest request in the window expires (i.e. a slot opens).
    pub retry_after_secs: u64,
}

pub struct RateLimiter {
    limits: Mutex<HashMap<String, Vec<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        RateLimiter {
            limits: Mutex::new(HashMap::new()),
        }
    }

    /// Check if a request is allowed. Returns true if allowed, false if rate limited.
    /// `key` is typically "action:id", `max` is max requests, `window_secs` is the time window.
    pub fn check(&self, key: &str, max: usize, window_secs: u64) -> bool {
        self.check_with_info(key, max, window_secs).allowed
    }

    pub fn check_with_info(&self, key: &str, max: usize, window_secs: u64) -> RateLimitInfo {
        let mut limits = self.limits.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let window = std::time::Duration::from_secs(window_secs);

        let entries = limits.entry(key.to_string()).or_default();

        entries.retain(|t| now.duration_since(*t) < window);

        if entries.len() >= max {
            let oldest = match entries.iter().min() {
                Some(t) => *t,
                None => {
                    return RateLimitInfo {
                        allowed: false,
                        remaining: 0,
                        limit: max,
                        retry_after_secs: 1,
                    };
                }
            };
            let elapsed = now.duration_since(oldest);
            let retry_after = if elapsed < window {
                (window - elapsed).as_secs() + 1
            } else {
                1
            };

            return RateLimitInfo {
                allowed: false,
                limit: max,
                remaining: 0,
                retry_after_secs: retry_after,
            };
        }

        entries.push(now);
        let remaining = max - entries.len();

        RateLimitInfo {
            allowed: true,
            limit: max,
            remaining,
            retry_after_secs: 0,
        }
    }

    /// Drops tracking for a key entirely, used when a WebSocket connection closes.
    pub fn forget(&self, key: &str) {
        self.limits.lock().unwrap_or_else(|e| e.into_inner()).remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_max_then_blocks() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.check("k", 5, 60));
        }
        assert!(!limiter.check("k", 5, 60));
    }
}
