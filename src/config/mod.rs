// src/config/mod.rs

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::algorithms::Algorithm;
use crate::error::{RateLimiterError, Result};

const ENV_KEY_PREFIX: &str = "WINDOW_LIMITER_KEY_PREFIX";
const ENV_TIMEOUT_MS: &str = "WINDOW_LIMITER_TIMEOUT_MS";
const ENV_ALGORITHM: &str = "WINDOW_LIMITER_ALGORITHM";

/// Configuration for a [`crate::RateLimiter`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Key prefix to use for all keys in storage
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Upper bound on a single store call
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Window algorithm applied to every check
    #[serde(default)]
    pub algorithm: Algorithm,
}

fn default_key_prefix() -> String {
    "ratelimit".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            timeout: default_timeout(),
            algorithm: Algorithm::default(),
        }
    }
}

impl LimiterConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| RateLimiterError::Config(format!("invalid limiter config: {}", e)))
    }

    /// Build from `WINDOW_LIMITER_*` environment variables, defaulting
    /// whatever is unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(prefix) = lookup(ENV_KEY_PREFIX) {
            config.key_prefix = prefix;
        }

        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            let millis = raw.trim().parse::<u64>().map_err(|e| {
                RateLimiterError::Config(format!("{} must be milliseconds: {}", ENV_TIMEOUT_MS, e))
            })?;
            if millis == 0 {
                return Err(RateLimiterError::Config(format!(
                    "{} must be greater than zero",
                    ENV_TIMEOUT_MS
                )));
            }
            config.timeout = Duration::from_millis(millis);
        }

        if let Some(raw) = lookup(ENV_ALGORITHM) {
            config.algorithm = raw.trim().parse()?;
        }

        Ok(config)
    }
}

/// Configuration for Redis storage backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Connection timeout
    #[serde(default = "default_conn_timeout", with = "duration_serde")]
    pub connection_timeout: Duration,
}

fn default_conn_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Configuration for in-memory storage backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryConfig {
    /// Maximum number of live keys to hold.
    ///
    /// A hard admission cap: once this many keys are live within their
    /// two-window lifetime and none can be purged, checks for a new key fail
    /// with `StoreUnavailable(CapacityExceeded)`. Size it above the number of
    /// distinct keys expected in `2 * window_ms`.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Whether to use a background task for expiration
    #[serde(default = "default_use_background_task")]
    pub use_background_task: bool,

    /// How often to run the background expiration task
    #[serde(default = "default_cleanup_interval", with = "duration_serde")]
    pub cleanup_interval: Duration,
}

fn default_max_entries() -> usize {
    1_000_000
}

fn default_use_background_task() -> bool {
    true
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(60)
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            use_background_task: default_use_background_task(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

// Helper module to serialize/deserialize Duration with serde
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
