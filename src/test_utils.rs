// src/test_utils.rs

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::clock::ManualClock;
use super::config::{InMemoryConfig, LimiterConfig};
use super::error::{RateLimiterError, Result, StorageError};
use super::storage::{CounterSnapshot, CounterStore, MemoryStorage};
use super::{Algorithm, RateLimiter};

/// Memory config without the sweep task, so tests control expiry
pub fn test_memory_config() -> InMemoryConfig {
    InMemoryConfig {
        max_entries: 1_000,
        use_background_task: false,
        cleanup_interval: Duration::from_secs(1),
    }
}

/// Mock store wrapping a real memory store.
///
/// Counts calls per operation and can be told to fail, stall, or hand back
/// snapshots no atomic store would produce.
#[derive(Debug, Clone)]
pub struct MockStore {
    inner: MemoryStorage,
    increments: Arc<AtomicUsize>,
    gets: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
    corrupt: Arc<AtomicBool>,
    delay: Arc<Mutex<Option<Duration>>>,
    decrement_supported: bool,
}

impl MockStore {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            inner: MemoryStorage::with_clock(test_memory_config(), Arc::new(clock)),
            increments: Arc::new(AtomicUsize::new(0)),
            gets: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(AtomicBool::new(false)),
            corrupt: Arc::new(AtomicBool::new(false)),
            delay: Arc::new(Mutex::new(None)),
            decrement_supported: true,
        }
    }

    pub fn without_decrement(mut self) -> Self {
        self.decrement_supported = false;
        self
    }

    pub fn increments(&self) -> usize {
        self.increments.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_corrupt(&self, corrupt: bool) {
        self.corrupt.store(corrupt, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    async fn before_call(&self) -> Result<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(RateLimiterError::StoreUnavailable(
                StorageError::RedisConnection("connection refused".to_string()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CounterStore for MockStore {
    async fn increment(&self, key: &str, window_ms: u64) -> Result<CounterSnapshot> {
        self.increments.fetch_add(1, Ordering::SeqCst);
        self.before_call().await?;

        let mut snapshot = self.inner.increment(key, window_ms).await?;
        if self.corrupt.load(Ordering::SeqCst) {
            snapshot.count = 0;
        }
        Ok(snapshot)
    }

    async fn get(&self, key: &str) -> Result<Option<CounterSnapshot>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.before_call().await?;
        self.inner.get(key).await
    }

    async fn reset(&self, key: &str) -> Result<()> {
        self.before_call().await?;
        self.inner.reset(key).await
    }

    async fn decrement(&self, key: &str) -> Result<()> {
        self.before_call().await?;
        self.inner.decrement(key).await
    }

    fn supports_decrement(&self) -> bool {
        self.decrement_supported
    }
}

/// Helper function to create a test rate limiter over a mock store
pub fn create_test_rate_limiter(
    algorithm: Algorithm,
    clock: &ManualClock,
) -> (RateLimiter<MockStore>, MockStore) {
    let store = MockStore::new(clock.clone());
    let config = LimiterConfig {
        key_prefix: "test".to_string(),
        timeout: Duration::from_secs(1),
        algorithm,
    };
    let limiter = RateLimiter::new(store.clone(), config).with_clock(Arc::new(clock.clone()));
    (limiter, store)
}
