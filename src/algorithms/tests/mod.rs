// src/algorithms/tests/mod.rs

// Tests for Fixed Window algorithm
mod fixed_window_tests;


/// Common tests for both algorithms
#[cfg(test)]
mod common_tests {
    use crate::algorithms::{Algorithm, FixedWindow, SlidingWindow, WindowAlgorithm, WindowSpec};
    use crate::error::RateLimiterError;
    use crate::storage::CounterSnapshot;

    fn snapshot(count: u64, previous_count: u64, elapsed: u64) -> CounterSnapshot {
        CounterSnapshot {
            count,
            window_start: 1_000_000,
            previous_count,
            observed_at: 1_000_000 + elapsed,
        }
    }

    #[test]
    fn test_window_spec_validation() {
        assert!(WindowSpec::new(1, 1).is_ok());

        let err = WindowSpec::new(0, 1_000).unwrap_err();
        assert!(matches!(err, RateLimiterError::InvalidSpec(_)));

        let err = WindowSpec::new(10, 0).unwrap_err();
        assert!(matches!(err, RateLimiterError::InvalidSpec(_)));

        // Struct literals bypass new(), validate() still catches them
        let spec = WindowSpec {
            limit: 0,
            window_ms: 0,
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_algorithms_agree_without_previous_window() {
        let spec = WindowSpec::new(5, 10_000).unwrap();

        for count in 1..=7 {
            let snap = snapshot(count, 0, 4_000);
            let fixed = FixedWindow.evaluate(&snap, &spec);
            let sliding = SlidingWindow.evaluate(&snap, &spec);

            assert_eq!(fixed, sliding, "count {} should give the same verdict", count);
            assert_eq!(fixed.allowed, count <= 5);
        }
    }

    #[test]
    fn test_reset_at_is_end_of_window() {
        let spec = WindowSpec::new(3, 5_000).unwrap();
        let snap = snapshot(1, 2, 1_234);

        for algorithm in [Algorithm::FixedWindow, Algorithm::SlidingWindow] {
            let verdict = algorithm.evaluate(&snap, &spec);
            assert_eq!(verdict.reset_at, 1_005_000, "{}", algorithm);
            assert_eq!(verdict.limit, 3);
        }
    }

    #[test]
    fn test_algorithm_enum_dispatch_and_names() {
        let spec = WindowSpec::new(10, 60_000).unwrap();
        let snap = snapshot(1, 10, 0);

        // Fixed ignores the previous window, sliding counts all of it at elapsed 0
        assert!(Algorithm::FixedWindow.evaluate(&snap, &spec).allowed);
        assert!(!Algorithm::SlidingWindow.evaluate(&snap, &spec).allowed);

        assert_eq!(Algorithm::default(), Algorithm::SlidingWindow);
        assert_eq!(Algorithm::FixedWindow.to_string(), "fixed_window");
        assert_eq!(
            "sliding_window".parse::<Algorithm>().unwrap(),
            Algorithm::SlidingWindow
        );
        assert!("token_bucket".parse::<Algorithm>().is_err());
    }

    #[test]
    fn test_verdict_helpers() {
        let spec = WindowSpec::new(2, 1_000).unwrap();
        let verdict = FixedWindow.evaluate(&snapshot(2, 0, 400), &spec);

        assert!(verdict.allowed);
        assert!(verdict.is_exhausted());
        assert_eq!(verdict.reset_after(1_000_400).as_millis(), 600);
        assert_eq!(verdict.reset_after(2_000_000).as_millis(), 0);
    }
}
