// src/storage/memory.rs

// In-memory counter store (reference implementation and single-process use)
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::InMemoryConfig;
use crate::error::{RateLimiterError, Result, StorageError};
use crate::storage::{CounterRecord, CounterSnapshot, CounterStore};

type CounterMap = HashMap<String, CounterRecord>;

/// Aborts the sweep task when the last store clone goes away
#[derive(Debug)]
struct SweepGuard(JoinHandle<()>);

impl Drop for SweepGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// In-memory counter store.
///
/// One mutex guards the whole map, so every increment, including a window
/// roll, is a single critical section. Clones share the same map: create one
/// per process and hand clones to the limiters that should share quotas.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    data: Arc<Mutex<CounterMap>>,
    config: InMemoryConfig,
    clock: Arc<dyn Clock>,
    _sweeper: Option<Arc<SweepGuard>>,
}

impl MemoryStorage {
    /// Creates a new in-memory store reading the system clock
    pub fn new(config: InMemoryConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a new in-memory store reading time from `clock`
    pub fn with_clock(config: InMemoryConfig, clock: Arc<dyn Clock>) -> Self {
        let data = Arc::new(Mutex::new(HashMap::with_capacity(
            config.max_entries.min(10_000),
        )));

        let sweeper = if config.use_background_task {
            Self::spawn_sweeper(&data, &clock, &config)
        } else {
            None
        };

        Self {
            data,
            config,
            clock,
            _sweeper: sweeper,
        }
    }

    fn spawn_sweeper(
        data: &Arc<Mutex<CounterMap>>,
        clock: &Arc<dyn Clock>,
        config: &InMemoryConfig,
    ) -> Option<Arc<SweepGuard>> {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No tokio runtime available, expired counters are only dropped on access");
                return None;
            }
        };

        let weak: Weak<Mutex<CounterMap>> = Arc::downgrade(data);
        let clock = Arc::clone(clock);
        let period = config.cleanup_interval;

        let task = handle.spawn(async move {
            let mut interval = time::interval(period);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(data) = weak.upgrade() else {
                    break;
                };
                match lock(&data) {
                    Ok(mut map) => {
                        let removed = purge(&mut map, clock.now_millis());
                        if removed > 0 {
                            debug!(removed, remaining = map.len(), "Swept expired counters");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Counter sweep stopped");
                        break;
                    }
                };
            }
        });

        Some(Arc::new(SweepGuard(task)))
    }

    /// Remove every expired record now. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let mut data = lock(&self.data)?;
        Ok(purge(&mut data, self.clock.now_millis()))
    }

    /// Number of records held, expired ones included until purged
    pub fn len(&self) -> Result<usize> {
        Ok(lock(&self.data)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn lock(data: &Mutex<CounterMap>) -> Result<MutexGuard<'_, CounterMap>> {
    data.lock()
        .map_err(|e| RateLimiterError::StoreUnavailable(StorageError::LockPoisoned(e.to_string())))
}

fn purge(data: &mut CounterMap, now: u64) -> usize {
    let before = data.len();
    data.retain(|_, record| !record.is_expired(now));
    before - data.len()
}

#[async_trait]
impl CounterStore for MemoryStorage {
    async fn increment(&self, key: &str, window_ms: u64) -> Result<CounterSnapshot> {
        if window_ms == 0 {
            return Err(RateLimiterError::InvalidSpec(
                "window_ms must be at least 1".to_string(),
            ));
        }

        let mut data = lock(&self.data)?;
        let now = self.clock.now_millis();

        if let Some(record) = data.get_mut(key) {
            let observed_at = record.apply_increment(now, window_ms);
            return Ok(record.snapshot(observed_at));
        }

        // Apply max entries limit, making room from expired keys first
        if data.len() >= self.config.max_entries {
            purge(&mut data, now);
            if data.len() >= self.config.max_entries {
                return Err(RateLimiterError::StoreUnavailable(
                    StorageError::CapacityExceeded(format!(
                        "{} live keys held, refusing new key",
                        data.len()
                    )),
                ));
            }
        }

        let record = CounterRecord::first(now, window_ms);
        let snapshot = record.snapshot(now);
        data.insert(key.to_string(), record);
        Ok(snapshot)
    }

    async fn get(&self, key: &str) -> Result<Option<CounterSnapshot>> {
        let data = lock(&self.data)?;
        let now = self.clock.now_millis();

        Ok(data
            .get(key)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.snapshot(now)))
    }

    async fn reset(&self, key: &str) -> Result<()> {
        let mut data = lock(&self.data)?;
        data.remove(key);
        Ok(())
    }

    async fn decrement(&self, key: &str) -> Result<()> {
        let mut data = lock(&self.data)?;
        let now = self.clock.now_millis();

        if let Some(record) = data.get_mut(key) {
            record.apply_decrement(now);
        }
        Ok(())
    }

    fn supports_decrement(&self) -> bool {
        true
    }
}
