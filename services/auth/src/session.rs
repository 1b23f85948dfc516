//! Session and flash message management using Redis
//!
//! A session is addressed by a random id carried in an HttpOnly cookie.
//! Logged-in sessions map `session:{sid}` to the user's id with a TTL.
//! Flash messages are one-shot notices queued under `flash:{sid}` and
//! drained by the next rendered page; a cookie with no `session:` entry is
//! an anonymous session that exists only to carry flashes.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use common::cache::RedisPool;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "sid";

/// Severity of a flash message, mirrored in the rendered page styling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Danger,
}

/// One-shot user-facing notice shown on the next rendered page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session lifetime in seconds (default: 1 day)
    pub ttl_seconds: u64,
}

impl SessionConfig {
    /// Create a new SessionConfig from environment variables
    ///
    /// # Environment Variables
    /// - `SESSION_TTL`: Session lifetime in seconds (default: 86400)
    pub fn from_env() -> Result<Self> {
        let ttl_seconds = std::env::var("SESSION_TTL")
            .unwrap_or_else(|_| "86400".to_string()) // 1 day
            .parse()
            .unwrap_or(86400);

        Ok(SessionConfig { ttl_seconds })
    }
}

/// Session manager for handling user sessions and flash queues in Redis
#[derive(Clone)]
pub struct SessionManager {
    redis_pool: RedisPool,
    config: SessionConfig,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(redis_pool: RedisPool, config: SessionConfig) -> Self {
        Self { redis_pool, config }
    }

    /// Generate a fresh session id
    pub fn new_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Bind a session id to a logged-in user
    pub async fn log_in(&self, session_id: &str, user_id: Uuid) -> Result<()> {
        info!("Starting session for user: {}", user_id);

        let session_key = format!("session:{}", session_id);
        self.redis_pool
            .set(
                &session_key,
                &user_id.to_string(),
                Some(self.config.ttl_seconds),
            )
            .await?;

        Ok(())
    }

    /// Resolve a session id to the logged-in user, if any
    pub async fn current_user_id(&self, session_id: &str) -> Result<Option<Uuid>> {
        let session_key = format!("session:{}", session_id);
        let value = self.redis_pool.get(&session_key).await?;

        match value {
            Some(raw) => Ok(Uuid::parse_str(&raw).ok()),
            None => Ok(None),
        }
    }

    /// End a logged-in session
    ///
    /// The flash queue is left in place so a goodbye notice survives the
    /// logout redirect.
    pub async fn log_out(&self, session_id: &str) -> Result<()> {
        info!("Ending session: {}", session_id);

        let session_key = format!("session:{}", session_id);
        self.redis_pool.delete(&session_key).await?;

        Ok(())
    }

    /// Queue a flash message for the next rendered page
    pub async fn flash(&self, session_id: &str, level: FlashLevel, message: &str) -> Result<()> {
        let flash_key = format!("flash:{}", session_id);
        let entry = serde_json::to_string(&Flash {
            level,
            message: message.to_string(),
        })?;

        self.redis_pool
            .list_push(&flash_key, &entry, self.config.ttl_seconds)
            .await?;

        Ok(())
    }

    /// Drain all queued flash messages
    pub async fn take_flashes(&self, session_id: &str) -> Result<Vec<Flash>> {
        let flash_key = format!("flash:{}", session_id);
        let entries = self.redis_pool.list_drain(&flash_key).await?;

        let flashes = entries
            .iter()
            .filter_map(|raw| serde_json::from_str(raw).ok())
            .collect();

        Ok(flashes)
    }

    /// Get the session lifetime
    pub fn ttl_seconds(&self) -> u64 {
        self.config.ttl_seconds
    }
}
