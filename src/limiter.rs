// src/limiter.rs

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time;
use tracing::{debug, info, warn};

use crate::algorithms::{Algorithm, Verdict, WindowAlgorithm, WindowSpec};
use crate::clock::{Clock, SystemClock};
use crate::config::LimiterConfig;
use crate::error::{RateLimiterError, Result, StorageError};
use crate::storage::{CounterSnapshot, CounterStore};
use crate::{rate_limit_event, storage_op};

/// Per-call flags for [`RateLimiter::check`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckOptions {
    /// Count the request and compute the verdict, but never deny
    pub dry_run: bool,

    /// Admit without counting or touching the store
    pub skip: bool,
}

impl CheckOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            skip: false,
        }
    }

    pub fn skip() -> Self {
        Self {
            dry_run: false,
            skip: true,
        }
    }
}

/// Admission decision entry point.
///
/// Holds no per-key state of its own: every check is one atomic increment
/// against the injected store followed by a pure evaluation. Store failures
/// are returned as-is and never retried here, so the caller picks fail-open
/// or fail-closed.
#[derive(Debug)]
pub struct RateLimiter<S>
where
    S: CounterStore,
{
    store: S,
    config: LimiterConfig,
    clock: Arc<dyn Clock>,
}

impl<S> RateLimiter<S>
where
    S: CounterStore,
{
    pub fn new(store: S, config: LimiterConfig) -> Self {
        Self {
            store,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used for skipped checks
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.config.algorithm
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Decide whether the request identified by `key` is admitted under `spec`.
    ///
    /// Non-skipped calls increment the store exactly once, whatever the
    /// outcome. There is no way to look before incrementing.
    pub async fn check(&self, key: &str, spec: &WindowSpec, options: CheckOptions) -> Result<Verdict> {
        spec.validate()?;

        if options.skip {
            let now = self.clock.now_millis();
            debug!(key, "Rate limit check skipped");
            return Ok(Verdict {
                allowed: true,
                limit: spec.limit,
                remaining: spec.limit,
                reset_at: spec.reset_at(now),
                current: 0.0,
            });
        }

        let storage_key = self.storage_key(key);
        let snapshot = self
            .timed("increment", &storage_key, self.store.increment(&storage_key, spec.window_ms))
            .await?;
        verify_snapshot(&storage_key, &snapshot)?;

        let mut verdict = self.config.algorithm.evaluate(&snapshot, spec);
        rate_limit_event!(key, verdict, spec.window_ms);

        if !verdict.allowed {
            if options.dry_run {
                warn!(
                    key,
                    algorithm = self.config.algorithm.name(),
                    current = verdict.current,
                    limit = verdict.limit,
                    "Dry run: request would have been denied"
                );
                verdict.allowed = true;
            } else {
                info!(
                    key,
                    algorithm = self.config.algorithm.name(),
                    current = verdict.current,
                    limit = verdict.limit,
                    reset_at = verdict.reset_at,
                    "Request denied"
                );
            }
        }

        Ok(verdict)
    }

    /// Current counter state for `key`, for dashboards and debugging only
    pub async fn usage(&self, key: &str) -> Result<Option<CounterSnapshot>> {
        let storage_key = self.storage_key(key);
        self.timed("get", &storage_key, self.store.get(&storage_key))
            .await
    }

    /// Clear the quota of `key`
    pub async fn reset(&self, key: &str) -> Result<()> {
        let storage_key = self.storage_key(key);
        self.timed("reset", &storage_key, self.store.reset(&storage_key))
            .await
    }

    /// Give back one request charged to `key` in its current window.
    ///
    /// Returns `false` without calling the store when the backend cannot
    /// decrement.
    pub async fn refund(&self, key: &str) -> Result<bool> {
        if !self.store.supports_decrement() {
            debug!(key, "Store does not support decrement, refund ignored");
            return Ok(false);
        }

        let storage_key = self.storage_key(key);
        self.timed("decrement", &storage_key, self.store.decrement(&storage_key))
            .await?;
        Ok(true)
    }

    fn storage_key(&self, key: &str) -> String {
        if self.config.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.config.key_prefix, key)
        }
    }

    async fn timed<T, F>(&self, operation: &'static str, key: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = match time::timeout(self.config.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RateLimiterError::StoreUnavailable(StorageError::Timeout(
                format!(
                    "{} on '{}' took longer than {:?}",
                    operation, key, self.config.timeout
                ),
            ))),
        };
        storage_op!(operation, key, result, started.elapsed().as_millis() as u64);
        result
    }
}

/// Reject snapshots an atomic store could never have produced
fn verify_snapshot(key: &str, snapshot: &CounterSnapshot) -> Result<()> {
    if snapshot.count == 0 {
        return Err(RateLimiterError::StoreRace(format!(
            "increment on '{}' returned a zero count",
            key
        )));
    }
    if snapshot.window_start > snapshot.observed_at {
        return Err(RateLimiterError::StoreRace(format!(
            "increment on '{}' returned window_start {} after observed_at {}",
            key, snapshot.window_start, snapshot.observed_at
        )));
    }
    Ok(())
}
