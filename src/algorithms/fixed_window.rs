// src/algorithms/fixed_window.rs

use crate::algorithms::{Verdict, WindowAlgorithm, WindowSpec};
use crate::storage::CounterSnapshot;

/// Fixed Window rate limiting algorithm
///
/// Counts requests since the window started and denies once the count passes
/// the limit. Cheap, but a client can get up to twice the limit through by
/// bunching requests on either side of a window boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedWindow;

impl WindowAlgorithm for FixedWindow {
    fn name(&self) -> &'static str {
        "fixed_window"
    }

    fn evaluate(&self, snapshot: &CounterSnapshot, spec: &WindowSpec) -> Verdict {
        Verdict {
            allowed: snapshot.count <= spec.limit,
            limit: spec.limit,
            remaining: spec.limit.saturating_sub(snapshot.count),
            reset_at: spec.reset_at(snapshot.window_start),
            current: snapshot.count as f64,
        }
    }
}
