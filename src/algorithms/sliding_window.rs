// src/algorithms/sliding_window.rs

use crate::algorithms::{Verdict, WindowAlgorithm, WindowSpec};
use crate::storage::CounterSnapshot;

/// Sliding Window rate limiting algorithm
///
/// Approximates a window trailing the current moment by adding the previous
/// window's count, weighted by how much of the previous window still falls
/// inside that trailing span. This smooths out the boundary bursts a fixed
/// window lets through, with the same per-key state.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlidingWindow;

impl SlidingWindow {
    /// Share of the previous window still counted, from 1 at the start of
    /// the current window down to 0 once a full window has elapsed
    pub fn previous_weight(snapshot: &CounterSnapshot, spec: &WindowSpec) -> f64 {
        let elapsed = snapshot.observed_at.saturating_sub(snapshot.window_start);
        let window = spec.window_ms.max(1) as f64;
        (1.0 - elapsed as f64 / window).clamp(0.0, 1.0)
    }

    pub fn weighted_count(snapshot: &CounterSnapshot, spec: &WindowSpec) -> f64 {
        snapshot.count as f64 + snapshot.previous_count as f64 * Self::previous_weight(snapshot, spec)
    }
}

impl WindowAlgorithm for SlidingWindow {
    fn name(&self) -> &'static str {
        "sliding_window"
    }

    fn evaluate(&self, snapshot: &CounterSnapshot, spec: &WindowSpec) -> Verdict {
        let current = Self::weighted_count(snapshot, spec);
        let limit = spec.limit as f64;

        Verdict {
            allowed: current <= limit,
            limit: spec.limit,
            remaining: (limit - current).floor().max(0.0) as u64,
            reset_at: spec.reset_at(snapshot.window_start),
            current,
        }
    }
}
