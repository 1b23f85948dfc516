//! Rate limiter for login and password-reset attempts

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::info;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum number of attempts allowed within the window
    pub max_attempts: u32,
    /// Time window in seconds
    pub window_seconds: u64,
    /// Ban duration in seconds once the limit is exceeded
    pub ban_duration_seconds: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_seconds: 300,        // 5 minutes
            ban_duration_seconds: 3600, // 1 hour
        }
    }
}

/// Rate limiter entry
#[derive(Debug)]
struct RateLimiterEntry {
    /// Number of attempts
    attempts: u32,
    /// Last attempt time
    last_attempt: Instant,
    /// Ban expiration time
    ban_expires: Option<Instant>,
}

/// In-memory rate limiter keyed by an arbitrary string (here: the submitted
/// email address)
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Arc<Mutex<HashMap<String, RateLimiterEntry>>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record an attempt for a key and report whether it is allowed
    pub async fn is_allowed(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let entry = entries.entry(key.to_string()).or_insert(RateLimiterEntry {
            attempts: 0,
            last_attempt: now,
            ban_expires: None,
        });

        // Check if ban has expired
        if let Some(ban_expires) = entry.ban_expires {
            if now >= ban_expires {
                entry.attempts = 0;
                entry.ban_expires = None;
            } else {
                return false;
            }
        }

        // Check if window has expired
        if now.duration_since(entry.last_attempt) >= Duration::from_secs(self.config.window_seconds)
        {
            entry.attempts = 0;
        }

        // Check if we're over the limit
        if entry.attempts >= self.config.max_attempts {
            entry.ban_expires = Some(now + Duration::from_secs(self.config.ban_duration_seconds));
            info!(
                "Banned key {} for {} seconds",
                key, self.config.ban_duration_seconds
            );
            return false;
        }

        entry.attempts += 1;
        entry.last_attempt = now;

        true
    }

    /// Forget a key, e.g. after a successful login
    pub async fn clear(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
    }

    /// Get the rate limiter configuration
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict_limiter() -> RateLimiter {
        RateLimiter::new(RateLimiterConfig {
            max_attempts: 3,
            window_seconds: 300,
            ban_duration_seconds: 3600,
        })
    }

    #[tokio::test]
    async fn test_attempts_under_limit_are_allowed() {
        let limiter = strict_limiter();
        for _ in 0..3 {
            assert!(limiter.is_allowed("a@x.com").await);
        }
    }

    #[tokio::test]
    async fn test_exceeding_limit_bans_the_key() {
        let limiter = strict_limiter();
        for _ in 0..3 {
            assert!(limiter.is_allowed("a@x.com").await);
        }
        assert!(!limiter.is_allowed("a@x.com").await);
        // Once banned, further attempts stay blocked.
        assert!(!limiter.is_allowed("a@x.com").await);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = strict_limiter();
        for _ in 0..4 {
            limiter.is_allowed("a@x.com").await;
        }
        assert!(limiter.is_allowed("b@x.com").await);
    }

    #[tokio::test]
    async fn test_clear_resets_a_key() {
        let limiter = strict_limiter();
        for _ in 0..3 {
            limiter.is_allowed("a@x.com").await;
        }
        limiter.clear("a@x.com").await;
        assert!(limiter.is_allowed("a@x.com").await);
    }
}
