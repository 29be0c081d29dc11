//! Speed estimation: a two-state Kalman filter and a multi-window weighted
//! averager.
//!
//! Grounded on the original program's `algorithms.py::ExtendedKalman` and
//! `MultiWindowSpeedTracker`.

use std::collections::VecDeque;

use crate::constants::{
    KALMAN_INITIAL_COVARIANCE, KALMAN_MIN_DT, KALMAN_Q_ACCEL, KALMAN_Q_SPEED, KALMAN_R,
    SPEED_RING_CAPACITY, SPEED_WINDOWS, TREND_MIN_SAMPLES, TREND_WINDOW_SECONDS,
};
use crate::phase::Phase;

/// Two-state (speed, acceleration) Kalman filter fed by successive speed
/// measurements.
#[derive(Debug, Clone)]
pub struct KalmanTracker {
    speed: f64,
    accel: f64,
    /// Row-major 2x2 covariance: `[[p00, p01], [p10, p11]]`.
    covariance: [[f64; 2]; 2],
    last_update: Option<f64>,
    initialised: bool,
}

impl Default for KalmanTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl KalmanTracker {
    /// Builds a fresh, unseeded tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            speed: 0.0,
            accel: 0.0,
            covariance: [[0.0, 0.0], [0.0, 0.0]],
            last_update: None,
            initialised: false,
        }
    }

    /// Current estimated speed, bytes/s.
    #[must_use]
    pub const fn speed(&self) -> f64 {
        self.speed
    }

    /// Current estimated acceleration, bytes/s^2.
    #[must_use]
    pub const fn accel(&self) -> f64 {
        self.accel
    }

    /// Feeds a new speed measurement taken at wall-clock `now`.
    pub fn update(&mut self, measurement: f64, now: f64) {
        let Some(last) = self.last_update else {
            self.speed = measurement;
            self.accel = 0.0;
            self.covariance = [
                [KALMAN_INITIAL_COVARIANCE, 0.0],
                [0.0, KALMAN_INITIAL_COVARIANCE],
            ];
            self.last_update = Some(now);
            self.initialised = true;
            return;
        };

        let dt = now - last;
        if dt <= KALMAN_MIN_DT {
            return;
        }

        // Predict.
        let predicted_speed = self.speed + self.accel * dt;
        let p00 = self.covariance[0][0];
        let p01 = self.covariance[0][1];
        let p10 = self.covariance[1][0];
        let p11 = self.covariance[1][1];

        let pred_p00 = p00 + dt * (p10 + p01) + dt * dt * p11 + KALMAN_Q_SPEED;
        let pred_p01 = p01 + dt * p11;
        let pred_p10 = p10 + dt * p11;
        let pred_p11 = p11 + KALMAN_Q_ACCEL;

        // Update.
        let innovation = measurement - predicted_speed;
        let s = pred_p00 + KALMAN_R;
        let gain0 = pred_p00 / s;
        let gain1 = pred_p10 / s;

        self.speed = predicted_speed + gain0 * innovation;
        self.accel += gain1 * innovation;

        self.covariance[0][0] = (1.0 - gain0) * pred_p00;
        self.covariance[0][1] = (1.0 - gain0) * pred_p01;
        self.covariance[1][0] = pred_p10 - gain1 * pred_p00;
        self.covariance[1][1] = pred_p11 - gain1 * pred_p01;

        self.last_update = Some(now);
    }

    /// Predicts total bytes uploaded over the next `horizon` seconds,
    /// assuming constant acceleration, clamped to non-negative.
    #[must_use]
    pub fn predict_upload(&self, horizon: f64) -> f64 {
        let h = horizon.max(0.0);
        (self.speed * h + 0.5 * self.accel * h * h).max(0.0)
    }

    /// Resets the tracker to its unseeded state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Whether at least one measurement has been recorded.
    #[must_use]
    pub const fn is_initialised(&self) -> bool {
        self.initialised
    }
}

/// A single timestamped speed observation.
#[derive(Debug, Clone, Copy)]
struct Sample {
    ts: f64,
    speed: f64,
}

/// Multi-window weighted speed averager backed by a bounded sample ring.
#[derive(Debug, Clone, Default)]
pub struct SpeedTracker {
    samples: VecDeque<Sample>,
}

fn phase_weights(phase: Phase) -> [f64; 4] {
    match phase {
        Phase::Warmup => [0.1, 0.2, 0.3, 0.4],
        Phase::Catch => [0.2, 0.3, 0.3, 0.2],
        Phase::Steady => [0.3, 0.3, 0.2, 0.2],
        Phase::Finish => [0.5, 0.3, 0.15, 0.05],
    }
}

impl SpeedTracker {
    /// Builds an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a speed measurement at `now`, dropping the oldest sample once
    /// the ring reaches capacity.
    pub fn record(&mut self, now: f64, speed: f64) {
        if self.samples.len() >= SPEED_RING_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample { ts: now, speed });
    }

    /// Average speed of samples within `window` seconds of `now`, or `None`
    /// if no samples fall in the window.
    fn window_average(&self, now: f64, window: f64) -> Option<f64> {
        let cutoff = now - window;
        let mut sum = 0.0;
        let mut count = 0usize;
        for sample in self.samples.iter().rev() {
            if sample.ts < cutoff {
                break;
            }
            sum += sample.speed;
            count += 1;
        }
        if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }
    }

    /// Weighted average across the four speed windows, phase-selected
    /// weights, re-normalised over windows that actually had samples.
    #[must_use]
    pub fn weighted_average(&self, now: f64, phase: Phase) -> f64 {
        let weights = phase_weights(phase);
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for (window, weight) in SPEED_WINDOWS.iter().zip(weights.iter()) {
            if let Some(avg) = self.window_average(now, *window as f64) {
                weighted_sum += avg * weight;
                weight_total += weight;
            }
        }
        if weight_total <= 0.0 {
            0.0
        } else {
            weighted_sum / weight_total
        }
    }

    /// Relative change between the first and second half of the trailing
    /// [`TREND_WINDOW_SECONDS`] window. Requires at least
    /// [`TREND_MIN_SAMPLES`] samples in that window.
    #[must_use]
    pub fn recent_trend(&self, now: f64) -> f64 {
        let cutoff = now - TREND_WINDOW_SECONDS;
        let recent: Vec<f64> = self
            .samples
            .iter()
            .rev()
            .take_while(|s| s.ts >= cutoff)
            .map(|s| s.speed)
            .collect();
        if recent.len() < TREND_MIN_SAMPLES {
            return 0.0;
        }
        // `recent` is newest-first. The original splits the chronological
        // (oldest-first) sample list at `len / 2` and calls the back half
        // (size `ceil(len / 2)`) "newer" — so on an odd-length window the
        // extra sample belongs to the newer half, not the older one.
        let mid = recent.len() / 2;
        let (newer, older) = recent.split_at(recent.len() - mid);
        let newer_mean = newer.iter().sum::<f64>() / newer.len() as f64;
        let older_mean = older.iter().sum::<f64>() / older.len() as f64;
        crate::util::safe_div(newer_mean - older_mean, older_mean, 0.0)
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
    fn kalman_first_sample_seeds_state() {
        let mut k = KalmanTracker::new();
        k.update(1000.0, 0.0);
        assert_eq!(k.speed(), 1000.0);
        assert_eq!(k.accel(), 0.0);
        assert!(k.is_initialised());
    }

    #[test]
    fn kalman_zero_dt_is_idempotent() {
        let mut k = KalmanTracker::new();
        k.update(1000.0, 0.0);
        k.update(1200.0, 1.0);
        let speed_before = k.speed();
        let accel_before = k.accel();
        // Same timestamp again: dt == 0, update must be a no-op.
        k.update(999_999.0, 1.0);
        assert_eq!(k.speed(), speed_before);
        assert_eq!(k.accel(), accel_before);
    }

    #[test]
    fn kalman_tracks_rising_speed() {
        let mut k = KalmanTracker::new();
        k.update(1000.0, 0.0);
        for i in 1..20 {
            k.update(1000.0 + i as f64 * 100.0, i as f64);
        }
        assert!(k.speed() > 1000.0);
    }

    #[test]
    fn predict_upload_nonnegative() {
        let mut k = KalmanTracker::new();
        k.update(100.0, 0.0);
        k.update(50.0, 1.0);
        assert!(k.predict_upload(100.0) >= 0.0);
        assert_eq!(k.predict_upload(0.0), 0.0);
    }

    #[test]
    fn weighted_average_empty_is_zero() {
        let t = SpeedTracker::new();
        assert_eq!(t.weighted_average(100.0, Phase::Steady), 0.0);
    }

    #[test]
    fn weighted_average_uses_available_windows_only() {
        let mut t = SpeedTracker::new();
        // Only samples inside the 5s window exist; larger windows have none.
        t.record(96.0, 1000.0);
        t.record(98.0, 1000.0);
        let avg = t.weighted_average(100.0, Phase::Warmup);
        assert!((avg - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn trend_requires_minimum_samples() {
        let mut t = SpeedTracker::new();
        t.record(99.0, 100.0);
        t.record(99.5, 100.0);
        assert_eq!(t.recent_trend(100.0), 0.0);
    }

    #[test]
    fn trend_assigns_odd_middle_sample_to_newer_half() {
        let mut t = SpeedTracker::new();
        t.record(96.0, 10.0);
        t.record(97.0, 20.0);
        t.record(98.0, 30.0);
        t.record(99.0, 40.0);
        t.record(100.0, 50.0);
        // Chronological halves at mid = 5 / 2 = 2: older = [10, 20] (size 2),
        // newer = [30, 40, 50] (size 3, carrying the middle sample).
        let newer_mean = (30.0 + 40.0 + 50.0) / 3.0;
        let older_mean = (10.0 + 20.0) / 2.0;
        let want = (newer_mean - older_mean) / older_mean;
        assert!((t.recent_trend(100.0) - want).abs() < 1e-9);
    }

    #[test]
    fn trend_detects_rise() {
        let mut t = SpeedTracker::new();
        for i in 0..10 {
            let ts = 91.0 + i as f64;
            let speed = if i < 5 { 100.0 } else { 200.0 };
            t.record(ts, speed);
        }
        assert!(t.recent_trend(100.0) > 0.0);
    }
}
