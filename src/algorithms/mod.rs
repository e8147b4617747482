// src/algorithms/mod.rs

pub mod fixed_window;
pub mod sliding_window;

#[cfg(test)]
mod tests;

pub use fixed_window::FixedWindow;
pub use sliding_window::SlidingWindow;

use super::error::{RateLimiterError, Result};
use super::storage::CounterSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::str::FromStr;
use std::time::Duration;

/// Quota for one key: at most `limit` admitted requests per `window_ms`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub limit: u64,
    pub window_ms: u64,
}

impl WindowSpec {
    pub fn new(limit: u64, window_ms: u64) -> Result<Self> {
        let spec = Self { limit, window_ms };
        spec.validate()?;
        Ok(spec)
    }

    /// Reject zero limits and zero windows
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(RateLimiterError::InvalidSpec(
                "limit must be at least 1".to_string(),
            ));
        }
        if self.window_ms == 0 {
            return Err(RateLimiterError::InvalidSpec(
                "window_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// End of the window that started at `window_start`
    pub fn reset_at(&self, window_start: u64) -> u64 {
        window_start.saturating_add(self.window_ms)
    }
}

/// Outcome of one admission check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the request was allowed
    pub allowed: bool,

    /// Quota the request was checked against
    pub limit: u64,

    /// Requests still admissible in the current window
    pub remaining: u64,

    /// When the current window ends, in milliseconds since the Unix epoch
    pub reset_at: u64,

    /// Effective request count the decision was made on. Whole for fixed
    /// windows, a weighted estimate for sliding windows.
    pub current: f64,
}

impl Verdict {
    /// Time left until `reset_at`, zero if it has passed
    pub fn reset_after(&self, now_ms: u64) -> Duration {
        Duration::from_millis(self.reset_at.saturating_sub(now_ms))
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Turns the post-increment state of a key into a verdict.
///
/// Implementations are pure: same snapshot and spec, same verdict.
pub trait WindowAlgorithm: Send + Sync + Debug {
    /// Name used in logs
    fn name(&self) -> &'static str;

    fn evaluate(&self, snapshot: &CounterSnapshot, spec: &WindowSpec) -> Verdict;
}

/// Window algorithm selected by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    FixedWindow,
    #[default]
    SlidingWindow,
}

impl WindowAlgorithm for Algorithm {
    fn name(&self) -> &'static str {
        match self {
            Algorithm::FixedWindow => FixedWindow.name(),
            Algorithm::SlidingWindow => SlidingWindow.name(),
        }
    }

    fn evaluate(&self, snapshot: &CounterSnapshot, spec: &WindowSpec) -> Verdict {
        match self {
            Algorithm::FixedWindow => FixedWindow.evaluate(snapshot, spec),
            Algorithm::SlidingWindow => SlidingWindow.evaluate(snapshot, spec),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = RateLimiterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fixed_window" => Ok(Algorithm::FixedWindow),
            "sliding_window" => Ok(Algorithm::SlidingWindow),
            other => Err(RateLimiterError::Config(format!(
                "unknown algorithm '{}', expected fixed_window or sliding_window",
                other
            ))),
        }
    }
}
