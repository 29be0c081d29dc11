//! Session-level sample ring used by the download limiter and the
//! reannounce optimiser to compute recent average speeds.
//!
//! Grounded on the original program's `algorithms.py::SpeedTracker`
//! (the session-sample variant, distinct from the windowed speed
//! averager in [`crate::speed`]).

use std::collections::VecDeque;

use crate::constants::SESSION_RING_CAPACITY;
use crate::util::safe_div;

#[derive(Debug, Clone, Copy)]
struct SessionSample {
    ts: f64,
    uploaded: f64,
    downloaded: f64,
    up_speed: f64,
    down_speed: f64,
}

/// Average upload/download speed over a trailing window.
#[derive(Debug, Clone, Copy, Default)]
pub struct AvgSpeeds {
    /// Average upload speed, bytes/s.
    pub up: f64,
    /// Average download speed, bytes/s.
    pub down: f64,
}

/// Bounded ring of per-tick session samples.
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    samples: VecDeque<SessionSample>,
}

impl SessionTracker {
    /// Builds an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one sample, dropping the oldest once the ring is full.
    pub fn record(&mut self, ts: f64, uploaded: f64, downloaded: f64, up_speed: f64, down_speed: f64) {
        if self.samples.len() >= SESSION_RING_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(SessionSample { ts, uploaded, downloaded, up_speed, down_speed });
    }

    /// Average upload/download speed over the trailing `window` seconds
    /// ending at `now`, computed as the cumulative-byte delta between the
    /// window's oldest and newest sample divided by their time delta
    /// (matching the original's endpoint-based average rather than a mean
    /// of instantaneous per-tick speeds, which misweights uneven tick
    /// spacing). Requires at least two samples in the window.
    #[must_use]
    pub fn avg_speeds(&self, now: f64, window: f64) -> AvgSpeeds {
        let cutoff = now - window;
        let mut first = None;
        let mut last = None;
        let mut count = 0usize;
        for sample in self.samples.iter().rev() {
            if sample.ts < cutoff {
                break;
            }
            if last.is_none() {
                last = Some(sample);
            }
            first = Some(sample);
            count += 1;
        }
        let (Some(first), Some(last)) = (first, last) else {
            return AvgSpeeds::default();
        };
        if count < 2 {
            return AvgSpeeds::default();
        }
        let dt = last.ts - first.ts;
        AvgSpeeds {
            up: safe_div(last.uploaded - first.uploaded, dt, 0.0),
            down: safe_div(last.downloaded - first.downloaded, dt, 0.0),
        }
    }

    /// Drops every recorded sample.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tracker_returns_zero() {
        let t = SessionTracker::new();
        let avg = t.avg_speeds(100.0, 300.0);
        assert_eq!(avg.up, 0.0);
        assert_eq!(avg.down, 0.0);
    }

    #[test]
    fn single_sample_returns_zero() {
        let mut t = SessionTracker::new();
        t.record(99.0, 500.0, 200.0, 100.0, 50.0);
        let avg = t.avg_speeds(100.0, 10.0);
        assert_eq!(avg.up, 0.0);
        assert_eq!(avg.down, 0.0);
    }

    #[test]
    fn averages_within_window_use_endpoint_delta() {
        let mut t = SessionTracker::new();
        t.record(90.0, 0.0, 0.0, 999.0, 999.0);
        t.record(95.0, 1_000.0, 500.0, 999.0, 999.0);
        t.record(99.0, 1_400.0, 700.0, 999.0, 999.0);
        let avg = t.avg_speeds(100.0, 10.0);
        assert!((avg.up - (1_400.0 / 9.0)).abs() < 1e-6);
        assert!((avg.down - (700.0 / 9.0)).abs() < 1e-6);
    }
}
