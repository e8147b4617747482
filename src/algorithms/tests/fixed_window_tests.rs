#[cfg(test)]
mod tests {
    use crate::algorithms::{FixedWindow, WindowAlgorithm, WindowSpec};
    use crate::storage::CounterSnapshot;

    fn at_count(count: u64) -> CounterSnapshot {
        CounterSnapshot {
            count,
            window_start: 0,
            previous_count: 0,
            observed_at: count,
        }
    }

    /// L requests pass, the (L+1)th is denied, for a spread of limits
    #[test]
    fn test_limit_then_deny() {
        for limit in [1u64, 2, 3, 10, 100] {
            let spec = WindowSpec::new(limit, 60_000).unwrap();

            for count in 1..=limit {
                let verdict = FixedWindow.evaluate(&at_count(count), &spec);
                assert!(verdict.allowed, "request {} of {} should be allowed", count, limit);
                assert_eq!(verdict.remaining, limit - count);
            }

            let verdict = FixedWindow.evaluate(&at_count(limit + 1), &spec);
            assert!(!verdict.allowed, "request {} should be denied", limit + 1);
            assert_eq!(verdict.remaining, 0);
        }
    }

    #[test]
    fn test_current_is_the_raw_count() {
        let spec = WindowSpec::new(3, 5_000).unwrap();
        let verdict = FixedWindow.evaluate(&at_count(7), &spec);

        assert_eq!(verdict.current, 7.0);
        assert_eq!(verdict.remaining, 0);
        assert!(!verdict.allowed);
    }

    /// The previous window never counts against a fixed window
    #[test]
    fn test_previous_window_ignored() {
        let spec = WindowSpec::new(5, 1_000).unwrap();
        let snapshot = CounterSnapshot {
            count: 1,
            window_start: 10_000,
            previous_count: 5,
            observed_at: 10_000,
        };

        let verdict = FixedWindow.evaluate(&snapshot, &spec);
        assert!(verdict.allowed);
        assert_eq!(verdict.remaining, 4);
        assert_eq!(verdict.reset_at, 11_000);
    }
}
