#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Barrier;
    use tokio::time;
    use tokio_test::assert_ok;

    use crate::clock::ManualClock;
    use crate::config::InMemoryConfig;
    use crate::error::{RateLimiterError, StorageError};
    use crate::storage::conformance::{check_counts, verify_linearizable_increments};
    use crate::storage::{CounterStore, MemoryStorage};
    use crate::test_utils::test_memory_config;

    use super::super::common;

    // Helper function to create a MemoryStorage instance on a manual clock
    fn create_test_memory() -> (MemoryStorage, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        let memory = MemoryStorage::with_clock(test_memory_config(), Arc::new(clock.clone()));
        (memory, clock)
    }

    #[tokio::test]
    async fn test_memory_basic_operations() {
        let (memory, _clock) = create_test_memory();

        let result = time::timeout(
            Duration::from_secs(5),
            common::test_basic_operations(&memory),
        )
        .await;

        assert!(result.is_ok(), "Basic operations timed out");
        assert_ok!(result.unwrap());
    }

    #[tokio::test]
    async fn test_memory_decrement() {
        let (memory, _clock) = create_test_memory();
        assert!(memory.supports_decrement());
        assert_ok!(common::test_decrement(&memory).await);
    }

    #[tokio::test]
    async fn test_window_roll() {
        let (memory, clock) = create_test_memory();

        for _ in 0..3 {
            memory.increment("roll", 1_000).await.unwrap();
        }

        clock.advance(Duration::from_millis(1_000));
        let rolled = memory.increment("roll", 1_000).await.unwrap();

        assert_eq!(rolled.count, 1);
        assert_eq!(rolled.previous_count, 3);
        assert_eq!(rolled.window_start, 1_001_000);
        assert_eq!(rolled.observed_at, 1_001_000);

        clock.advance(Duration::from_millis(400));
        let next = memory.increment("roll", 1_000).await.unwrap();
        assert_eq!(next.count, 2);
        assert_eq!(next.previous_count, 3);
        assert_eq!(next.observed_at - next.window_start, 400);
    }

    /// get is read-only: it neither rolls an elapsed window nor counts
    #[tokio::test]
    async fn test_clock_step_back_keeps_counting() {
        let (memory, clock) = create_test_memory();

        let first = memory.increment("skewed", 60_000).await.unwrap();
        clock.set(first.window_start - 5);

        let second = memory.increment("skewed", 60_000).await.unwrap();
        assert_eq!(second.count, 2);
        assert_eq!(second.window_start, first.window_start);
        assert_eq!(second.observed_at, first.window_start);

        let read = memory.get("skewed").await.unwrap().unwrap();
        assert!(read.observed_at >= read.window_start);
    }

    #[tokio::test]
    async fn test_get_does_not_roll() {
        let (memory, clock) = create_test_memory();
        memory.increment("stale", 1_000).await.unwrap();
        memory.increment("stale", 1_000).await.unwrap();

        clock.advance(Duration::from_millis(1_500));
        let read = memory.get("stale").await.unwrap().unwrap();

        assert_eq!(read.count, 2);
        assert_eq!(read.previous_count, 0);
        assert_eq!(read.window_start, 1_000_000);
        assert_eq!(read.observed_at, 1_001_500);
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let (memory, clock) = create_test_memory();

        for _ in 0..4 {
            memory.increment("again", 1_000).await.unwrap();
        }
        clock.advance(Duration::from_millis(1_200));
        memory.increment("again", 1_000).await.unwrap();

        memory.reset("again").await.unwrap();
        memory.reset("again").await.unwrap();

        let fresh = memory.increment("again", 1_000).await.unwrap();
        assert_eq!(fresh.count, 1);
        assert_eq!(fresh.previous_count, 0);
    }

    #[tokio::test]
    async fn test_lazy_expiry_and_purge() {
        let (memory, clock) = create_test_memory();
        memory.increment("short", 100).await.unwrap();
        memory.increment("long", 10_000).await.unwrap();
        assert_eq!(memory.len().unwrap(), 2);

        clock.advance(Duration::from_millis(200));

        // Expired record reads as absent, but stays until purged
        assert_eq!(memory.get("short").await.unwrap(), None);
        assert!(memory.get("long").await.unwrap().is_some());
        assert_eq!(memory.len().unwrap(), 2);

        assert_eq!(memory.purge_expired().unwrap(), 1);
        assert_eq!(memory.len().unwrap(), 1);

        // An expired key starts a new series instead of rolling
        let fresh = memory.increment("short", 100).await.unwrap();
        assert_eq!(fresh.count, 1);
        assert_eq!(fresh.previous_count, 0);
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let clock = ManualClock::new(0);
        let memory = MemoryStorage::with_clock(
            InMemoryConfig {
                max_entries: 2,
                use_background_task: false,
                cleanup_interval: Duration::from_secs(1),
            },
            Arc::new(clock.clone()),
        );

        memory.increment("a", 1_000).await.unwrap();
        memory.increment("b", 1_000).await.unwrap();

        // Existing keys keep working at capacity
        assert_eq!(memory.increment("a", 1_000).await.unwrap().count, 2);

        let err = memory.increment("c", 1_000).await.unwrap_err();
        assert!(
            matches!(
                err,
                RateLimiterError::StoreUnavailable(StorageError::CapacityExceeded(_))
            ),
            "unexpected error: {:?}",
            err
        );
        assert!(err.is_store_unavailable());

        // Once the old keys expire there is room again
        clock.advance(Duration::from_millis(2_000));
        assert_eq!(memory.increment("c", 1_000).await.unwrap().count, 1);
        assert_eq!(memory.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_zero_window_rejected() {
        let (memory, _clock) = create_test_memory();
        let err = memory.increment("zero", 0).await.unwrap_err();
        assert!(matches!(err, RateLimiterError::InvalidSpec(_)));
        assert!(memory.is_empty().unwrap());
    }

    /// N tasks on N threads hitting one key must see exactly 1..=N
    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_increments_have_no_lost_updates() {
        let (memory, _clock) = create_test_memory();
        let tasks = 200;
        let barrier = Arc::new(Barrier::new(tasks));

        let handles: Vec<_> = (0..tasks)
            .map(|_| {
                let memory = memory.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    memory.increment("contended", 60_000).await.unwrap().count
                })
            })
            .collect();

        let mut counts = Vec::with_capacity(tasks);
        for handle in handles {
            counts.push(handle.await.unwrap());
        }

        let distinct: HashSet<u64> = counts.iter().copied().collect();
        assert_eq!(distinct.len(), tasks, "duplicate counts: {:?}", counts);
        assert_ok!(check_counts(counts));

        let read = memory.get("contended").await.unwrap().unwrap();
        assert_eq!(read.count, tasks as u64);
    }

    #[tokio::test]
    async fn test_memory_passes_conformance_check() {
        let (memory, _clock) = create_test_memory();
        assert_ok!(verify_linearizable_increments(&memory, "conformance", 60_000, 50).await);
        // The helper cleans up after itself
        assert_eq!(memory.get("conformance").await.unwrap(), None);
    }

    #[test]
    fn test_check_counts_flags_races() {
        assert!(check_counts(vec![3, 1, 2]).is_ok());
        assert!(check_counts(vec![]).is_ok());

        let duplicate = check_counts(vec![1, 2, 2]).unwrap_err();
        assert!(matches!(duplicate, RateLimiterError::StoreRace(ref msg) if msg.contains("lost update")));

        let gap = check_counts(vec![1, 2, 4]).unwrap_err();
        assert!(matches!(gap, RateLimiterError::StoreRace(_)));
    }

    // Test background cleanup task
    #[tokio::test]
    async fn test_memory_background_cleanup() {
        let clock = ManualClock::new(0);
        let memory = MemoryStorage::with_clock(
            InMemoryConfig {
                max_entries: 100,
                use_background_task: true,
                cleanup_interval: Duration::from_millis(50), // Very short for testing
            },
            Arc::new(clock.clone()),
        );

        for key in ["cleanup_key1", "cleanup_key2", "cleanup_key3"] {
            memory.increment(key, 100).await.unwrap();
        }
        assert_eq!(memory.len().unwrap(), 3);

        clock.advance(Duration::from_millis(500));

        // Give the sweep a few ticks
        time::sleep(Duration::from_millis(250)).await;
        assert_eq!(memory.len().unwrap(), 0, "sweep should have removed expired keys");
    }

    /// Outside a runtime the store still works, it just cannot sweep
    #[test]
    fn test_memory_without_runtime() {
        let memory = MemoryStorage::new(InMemoryConfig::default());

        tokio::runtime::Runtime::new().unwrap().block_on(async {
            let snapshot = memory.increment("no_runtime", 1_000).await.unwrap();
            assert_eq!(snapshot.count, 1);
        });
    }
}
