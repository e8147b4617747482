// src/storage/mod.rs

pub mod conformance;
pub mod memory;
pub mod redis;

#[cfg(test)]
mod tests;

pub use memory::MemoryStorage;
pub use redis::RedisStorage;

use super::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// State of one key as seen by a store operation.
///
/// Timestamps are milliseconds since the Unix epoch, taken from the store's
/// own clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Requests counted in the current window
    pub count: u64,

    /// When the current window started
    pub window_start: u64,

    /// Final count of the window before this one, 0 if there was none
    pub previous_count: u64,

    /// The store's clock at the time of the operation
    pub observed_at: u64,
}

/// Per-key counter state persisted by in-process stores
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRecord {
    pub count: u64,
    pub window_start: u64,
    pub previous_count: u64,
    pub window_ms: u64,
}

impl CounterRecord {
    /// A record holding the first request of a fresh window
    pub fn first(now: u64, window_ms: u64) -> Self {
        Self {
            count: 1,
            window_start: now,
            previous_count: 0,
            window_ms,
        }
    }

    /// Count one request at `now`, rolling the window first if it has
    /// elapsed. An expired record starts over with no previous window.
    ///
    /// A clock that stepped back behind `window_start` is read as
    /// `window_start`. Returns the time the increment was observed at, never
    /// earlier than the resulting `window_start`.
    ///
    /// Callers must hold whatever lock makes this atomic for the key.
    pub fn apply_increment(&mut self, now: u64, window_ms: u64) -> u64 {
        let now = now.max(self.window_start);
        self.window_ms = window_ms;
        let elapsed = now - self.window_start;

        if elapsed >= window_ms.saturating_mul(2) {
            *self = Self::first(now, window_ms);
        } else if elapsed >= window_ms {
            self.previous_count = self.count;
            self.count = 1;
            self.window_start = now;
        } else {
            self.count += 1;
        }
        now
    }

    /// Drop one request from the current window. Does nothing once the
    /// window has elapsed, since that count is about to become
    /// `previous_count`. Returns whether the count changed.
    pub fn apply_decrement(&mut self, now: u64) -> bool {
        if self.window_elapsed(now) || self.count == 0 {
            return false;
        }
        self.count -= 1;
        true
    }

    pub fn window_elapsed(&self, now: u64) -> bool {
        now.saturating_sub(self.window_start) >= self.window_ms
    }

    /// True once the window plus one grace window has passed
    pub fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.window_start) >= self.window_ms.saturating_mul(2)
    }

    /// State as seen at `observed_at`, clamped to the window start
    pub fn snapshot(&self, observed_at: u64) -> CounterSnapshot {
        CounterSnapshot {
            count: self.count,
            window_start: self.window_start,
            previous_count: self.previous_count,
            observed_at: observed_at.max(self.window_start),
        }
    }
}

/// Core trait that all counter stores must implement.
///
/// `increment` is the only operation the limiter decides on. It must be
/// atomic per key: concurrent increments never observe the same count, and
/// rolling an elapsed window happens inside the same atomic step.
#[async_trait]
pub trait CounterStore: Send + Sync + Debug {
    /// Count one request for `key` and return the state after the increment
    async fn increment(&self, key: &str, window_ms: u64) -> Result<CounterSnapshot>;

    /// Read the state for `key` without rolling or extending its window
    async fn get(&self, key: &str) -> Result<Option<CounterSnapshot>>;

    /// Forget everything about `key`
    async fn reset(&self, key: &str) -> Result<()>;

    /// Remove one request from the current window of `key`.
    ///
    /// Optional. The default does nothing; see [`CounterStore::supports_decrement`].
    async fn decrement(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    fn supports_decrement(&self) -> bool {
        false
    }
}

#[async_trait]
impl<S> CounterStore for Arc<S>
where
    S: CounterStore + ?Sized,
{
    async fn increment(&self, key: &str, window_ms: u64) -> Result<CounterSnapshot> {
        (**self).increment(key, window_ms).await
    }

    async fn get(&self, key: &str) -> Result<Option<CounterSnapshot>> {
        (**self).get(key).await
    }

    async fn reset(&self, key: &str) -> Result<()> {
        (**self).reset(key).await
    }

    async fn decrement(&self, key: &str) -> Result<()> {
        (**self).decrement(key).await
    }

    fn supports_decrement(&self) -> bool {
        (**self).supports_decrement()
    }
}
