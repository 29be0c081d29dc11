//! Process-wide precision feedback loop.
//!
//! Grounded on the original program's `algorithms.py::PrecisionTracker`.
//! Modelled as a `Clone`-able handle around a mutex-protected bounded ring,
//! matching the clone-a-handle idiom used for shared telemetry state.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::constants::{
    PRECISION_GLOBAL_ADJ_MAX, PRECISION_GLOBAL_ADJ_MIN, PRECISION_HISTORY_CAPACITY,
    PRECISION_MIN_PHASE_SAMPLES, PRECISION_MIN_SAMPLES, PRECISION_PHASE_ADJ_MAX,
    PRECISION_PHASE_ADJ_MIN,
};
use crate::phase::Phase;
use crate::util::clamp;

#[derive(Debug, Clone, Copy)]
struct Entry {
    ratio: f64,
    phase: Phase,
}

#[derive(Debug)]
struct Inner {
    history: VecDeque<Entry>,
    phase_adj: [f64; 4],
    global_adj: f64,
}

impl Default for Inner {
    fn default() -> Self {
        Self { history: VecDeque::new(), phase_adj: [1.0; 4], global_adj: 1.0 }
    }
}

fn phase_index(phase: Phase) -> usize {
    match phase {
        Phase::Warmup => 0,
        Phase::Catch => 1,
        Phase::Steady => 2,
        Phase::Finish => 3,
    }
}

/// A cloneable, thread-safe handle to the process-wide precision tracker.
#[derive(Debug, Clone)]
pub struct PrecisionTracker {
    inner: Arc<Mutex<Inner>>,
}

impl Default for PrecisionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PrecisionTracker {
    /// Builds a fresh tracker with neutral (1.0) adjustments.
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(Inner::default())) }
    }

    /// Records a completed cycle's ratio and phase, recomputing adjustments
    /// once enough history has accumulated.
    pub fn record(&self, ratio: f64, phase: Phase) {
        let mut inner = self.inner.lock().expect("precision tracker mutex poisoned");
        if inner.history.len() >= PRECISION_HISTORY_CAPACITY {
            inner.history.pop_front();
        }
        inner.history.push_back(Entry { ratio, phase });

        if inner.history.len() < PRECISION_MIN_SAMPLES {
            return;
        }

        for p in Phase::ALL {
            let idx = phase_index(p);
            let samples: Vec<f64> =
                inner.history.iter().filter(|e| e.phase == p).map(|e| e.ratio).collect();
            if samples.len() < PRECISION_MIN_PHASE_SAMPLES {
                continue;
            }
            let mean = samples.iter().sum::<f64>() / samples.len() as f64;
            let factor = if mean > 1.005 {
                0.998
            } else if mean > 1.001 {
                0.999
            } else if mean < 0.99 {
                1.002
            } else if mean < 0.995 {
                1.001
            } else {
                1.0
            };
            inner.phase_adj[idx] = clamp(
                inner.phase_adj[idx] * factor,
                PRECISION_PHASE_ADJ_MIN,
                PRECISION_PHASE_ADJ_MAX,
            );
        }

        let global_mean =
            inner.history.iter().map(|e| e.ratio).sum::<f64>() / inner.history.len() as f64;
        let global_factor = if global_mean > 1.002 {
            0.999
        } else if global_mean < 0.995 {
            1.001
        } else {
            1.0
        };
        inner.global_adj = clamp(
            inner.global_adj * global_factor,
            PRECISION_GLOBAL_ADJ_MIN,
            PRECISION_GLOBAL_ADJ_MAX,
        );
    }

    /// Combined multiplicative adjustment for a phase: `phase_adj *
    /// global_adj`, applied to the effective target before limit
    /// computation.
    #[must_use]
    pub fn adjustment(&self, phase: Phase) -> f64 {
        let inner = self.inner.lock().expect("precision tracker mutex poisoned");
        inner.phase_adj[phase_index(phase)] * inner.global_adj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_tracker_returns_one() {
        let tracker = PrecisionTracker::new();
        assert_eq!(tracker.adjustment(Phase::Steady), 1.0);
    }

    #[test]
    fn adjustment_stays_in_bounds() {
        let tracker = PrecisionTracker::new();
        for _ in 0..60 {
            tracker.record(1.5, Phase::Steady);
        }
        let adj = tracker.adjustment(Phase::Steady);
        assert!(adj >= PRECISION_PHASE_ADJ_MIN * PRECISION_GLOBAL_ADJ_MIN);
        assert!(adj <= PRECISION_PHASE_ADJ_MAX * PRECISION_GLOBAL_ADJ_MAX);
    }

    #[test]
    fn overupload_pulls_adjustment_down() {
        let tracker = PrecisionTracker::new();
        for _ in 0..10 {
            tracker.record(1.01, Phase::Catch);
        }
        assert!(tracker.adjustment(Phase::Catch) < 1.0);
    }

    #[test]
    fn underupload_pushes_adjustment_up() {
        let tracker = PrecisionTracker::new();
        for _ in 0..10 {
            tracker.record(0.97, Phase::Finish);
        }
        assert!(tracker.adjustment(Phase::Finish) > 1.0);
    }

    #[test]
    fn history_is_bounded() {
        let tracker = PrecisionTracker::new();
        for i in 0..100 {
            tracker.record(1.0 + (i as f64) * 0.0001, Phase::Warmup);
        }
        let inner = tracker.inner.lock().unwrap();
        assert!(inner.history.len() <= PRECISION_HISTORY_CAPACITY);
    }
}
