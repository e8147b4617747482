// src/storage/conformance.rs

//! Checks a [`CounterStore`] against the atomicity contract.
//!
//! Meant for adapter authors: point it at a live backend and a scratch key.

use futures::future::join_all;

use crate::error::{RateLimiterError, Result};
use crate::storage::CounterStore;

/// Reset `key`, fire `callers` concurrent increments at it and require the
/// returned counts to be exactly `1..=callers`.
///
/// A duplicate means two callers saw the same pre-increment count (a lost
/// update); a gap means a window rolled or an increment went missing. Either
/// is reported as [`RateLimiterError::StoreRace`]. `window_ms` must comfortably
/// exceed the time the burst takes.
pub async fn verify_linearizable_increments<S>(
    store: &S,
    key: &str,
    window_ms: u64,
    callers: usize,
) -> Result<()>
where
    S: CounterStore + ?Sized,
{
    store.reset(key).await?;

    let results = join_all((0..callers).map(|_| store.increment(key, window_ms))).await;

    let mut counts = Vec::with_capacity(callers);
    for result in results {
        counts.push(result?.count);
    }

    let cleanup = store.reset(key).await;
    check_counts(counts)?;
    cleanup
}

/// Require `counts` to be a permutation of `1..=counts.len()`
pub fn check_counts(mut counts: Vec<u64>) -> Result<()> {
    counts.sort_unstable();

    for (expected, observed) in (1..=counts.len() as u64).zip(counts.iter()) {
        if *observed != expected {
            let duplicated = counts.windows(2).any(|pair| pair[0] == pair[1]);
            return Err(RateLimiterError::StoreRace(format!(
                "{} increments returned {:?}; expected count {} but saw {}{}",
                counts.len(),
                counts,
                expected,
                observed,
                if duplicated { " (duplicate count, lost update)" } else { "" }
            )));
        }
    }

    Ok(())
}
