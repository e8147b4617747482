// src/storage/tests/mod.rs

mod memory_tests;

// Contract checks that should pass on any backend
pub(crate) mod common {
    use crate::error::Result;
    use crate::storage::CounterStore;

    // Increment, read back, isolate keys and reset
    pub async fn test_basic_operations<S: CounterStore>(storage: &S) -> Result<()> {
        let key = "test_basic_key";
        let other = "test_basic_other";
        storage.reset(key).await?;
        storage.reset(other).await?;

        // Nothing stored yet
        assert_eq!(storage.get(key).await?, None);

        let first = storage.increment(key, 60_000).await?;
        assert_eq!(first.count, 1);
        assert_eq!(first.previous_count, 0);

        let second = storage.increment(key, 60_000).await?;
        assert_eq!(second.count, 2);
        assert_eq!(second.window_start, first.window_start);

        // Other keys are untouched
        let isolated = storage.increment(other, 60_000).await?;
        assert_eq!(isolated.count, 1);

        // get reports the same state without counting
        let read = storage.get(key).await?.expect("key should exist");
        assert_eq!(read.count, 2);
        let read_again = storage.get(key).await?.expect("key should exist");
        assert_eq!(read_again.count, 2);

        // reset starts over
        storage.reset(key).await?;
        assert_eq!(storage.get(key).await?, None);
        let fresh = storage.increment(key, 60_000).await?;
        assert_eq!(fresh.count, 1);
        assert_eq!(fresh.previous_count, 0);

        // Cleanup
        storage.reset(key).await?;
        storage.reset(other).await?;

        Ok(())
    }

    // Decrement lowers the current count only, never below zero
    pub async fn test_decrement<S: CounterStore>(storage: &S) -> Result<()> {
        let key = "test_decrement_key";
        storage.reset(key).await?;

        storage.increment(key, 60_000).await?;
        storage.increment(key, 60_000).await?;
        storage.decrement(key).await?;

        let read = storage.get(key).await?.expect("key should exist");
        assert_eq!(read.count, 1);

        storage.decrement(key).await?;
        storage.decrement(key).await?;
        let read = storage.get(key).await?.expect("key should exist");
        assert_eq!(read.count, 0);
        assert_eq!(read.previous_count, 0);

        // Decrementing a missing key is harmless
        storage.decrement("test_decrement_missing").await?;
        assert_eq!(storage.get("test_decrement_missing").await?, None);

        storage.reset(key).await?;
        Ok(())
    }
}
