//! The upload rate controller: combines the Kalman/window speed estimate,
//! the phase-selected PID corrector, the quantiser, smoothing, the
//! physical ceiling, and the two safety overrides (overshoot guard,
//! overspeed brake) into a single per-tick limit decision.
//!
//! Grounded on the original program's
//! `algorithms.py::PrecisionLimitController.calculate`/`_smooth`.

use crate::constants::{
    CATCH_RELEASE_MULTIPLIER, FINISH_CORRECTION_GAIN, FINISH_CORRECTION_MIN,
    FINISH_OVER_THRESHOLD, FINISH_UNDER_THRESHOLD, MIN_LIMIT, OVERSHOOT_FORCE_MULTIPLIER,
    OVERSHOOT_PROGRESS_THRESHOLD, OVERSHOOT_SPEED_MULTIPLIER, OVERSPEED_BRAKE_MARGIN, SPEED_LIMIT,
    SMOOTH_ACCEPT_THRESHOLD, SMOOTH_DEFAULT_BLEND_WEIGHT, SMOOTH_HALF_BLEND_THRESHOLD,
    SMOOTH_HALF_BLEND_WEIGHT, STEADY_HEADROOM_OVERRIDE_RATIO, WARMUP_HIGH_MULTIPLIER,
    WARMUP_MID_MULTIPLIER, WARMUP_PROGRESS_DONE, WARMUP_PROGRESS_HIGH, WARMUP_PROGRESS_MID,
};
use crate::phase::Phase;
use crate::pid::{coefficients, PidController};
use crate::quantizer::quantize;
use crate::util::{clamp, safe_div};

/// Inputs to one [`RateController::calculate`] call.
pub struct RateLimitInputs {
    /// Margin-adjusted target upload rate, bytes/s (precision adjustment
    /// applied internally).
    pub target_bytes_per_sec: f64,
    /// Multiplicative correction from the process-wide precision tracker.
    pub precision_adjustment: f64,
    /// Cumulative bytes uploaded since the current cycle started.
    pub uploaded_in_cycle: f64,
    /// Seconds remaining to the next announce.
    pub time_left: f64,
    /// Seconds elapsed in the current cycle.
    pub elapsed: f64,
    /// Current phase.
    pub phase: Phase,
    /// Wall clock, fed to the embedded PID controller.
    pub now: f64,
    /// Kalman-estimated instantaneous speed, bytes/s.
    pub kalman_speed: f64,
    /// Kalman-predicted upload over the remaining `time_left`.
    pub predicted_upload_remaining: f64,
    /// Multi-window weighted average speed, bytes/s.
    pub weighted_window_speed: f64,
    /// Short-term speed trend magnitude (used upstream by the quantiser).
    pub trend: f64,
    /// Physical ceiling, bytes/s; `0.0` disables it.
    pub physical_ceiling: f64,
    /// Session-wide real average upload speed, for the overspeed brake.
    pub real_avg_speed: f64,
}

/// Result of one rate-controller evaluation.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitOutput {
    /// New upload limit, bytes/s (`-1` = unlimited).
    pub limit: i64,
    /// Short machine-readable reason string.
    pub reason: &'static str,
}

/// Per-torrent upload rate controller: owns the PID state and the
/// previous-tick smoothed limit. The Kalman filter and windowed speed
/// averager live on the owning `TorrentState` and are passed in as plain
/// numbers.
#[derive(Debug, Clone, Default)]
pub struct RateController {
    pid: PidController,
    smoothed: Option<i64>,
}

impl RateController {
    /// Builds a fresh controller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets PID and smoothing state, called alongside the embedded
    /// filter resets on cycle rollover.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn smooth(&mut self, new_val: Option<i64>, phase: Phase) -> Option<i64> {
        let result = match (self.smoothed, new_val) {
            (None, _) | (_, None) => new_val,
            (Some(prev), Some(new)) if matches!(phase, Phase::Finish) => {
                let _ = prev;
                Some(new)
            }
            (Some(prev), Some(new)) => {
                let change = safe_div((new - prev).abs() as f64, prev as f64, 0.0);
                if change < SMOOTH_ACCEPT_THRESHOLD {
                    Some(new)
                } else if change >= SMOOTH_HALF_BLEND_THRESHOLD {
                    let blended = prev as f64 * (1.0 - SMOOTH_HALF_BLEND_WEIGHT)
                        + new as f64 * SMOOTH_HALF_BLEND_WEIGHT;
                    Some(blended.round() as i64)
                } else {
                    let blended = prev as f64 * (1.0 - SMOOTH_DEFAULT_BLEND_WEIGHT)
                        + new as f64 * SMOOTH_DEFAULT_BLEND_WEIGHT;
                    Some(blended.round() as i64)
                }
            }
        };
        self.smoothed = result;
        result
    }

    /// Runs one full rate-control evaluation.
    #[must_use]
    pub fn calculate(&mut self, inputs: &RateLimitInputs) -> RateLimitOutput {
        let adjusted_target = inputs.target_bytes_per_sec * inputs.precision_adjustment;

        let current_speed = if matches!(inputs.phase, Phase::Finish) {
            inputs.weighted_window_speed
        } else if inputs.kalman_speed > 0.0 {
            inputs.kalman_speed
        } else {
            inputs.weighted_window_speed
        };

        let total_time = inputs.elapsed + inputs.time_left;
        let target_total_bytes = adjusted_target * total_time;
        let predicted_ratio = safe_div(
            inputs.uploaded_in_cycle + inputs.predicted_upload_remaining,
            target_total_bytes,
            1.0,
        );
        let progress = safe_div(inputs.uploaded_in_cycle, target_total_bytes, 1.0);

        let (raw, mut reason): (Option<f64>, &'static str) = if inputs.time_left <= 0.0 {
            (None, "reporting")
        } else {
            let need = (target_total_bytes - inputs.uploaded_in_cycle).max(0.0);
            let required_speed = safe_div(need, inputs.time_left, 0.0);
            let pid_output = self.pid.update(target_total_bytes, inputs.uploaded_in_cycle, inputs.phase, inputs.now);

            match inputs.phase {
                Phase::Finish => {
                    let correction = if predicted_ratio > FINISH_OVER_THRESHOLD
                        || predicted_ratio < FINISH_UNDER_THRESHOLD
                    {
                        clamp(
                            1.0 - (predicted_ratio - 1.0) * FINISH_CORRECTION_GAIN,
                            FINISH_CORRECTION_MIN,
                            2.0 - FINISH_CORRECTION_MIN,
                        )
                    } else {
                        1.0
                    };
                    (Some(required_speed * pid_output * correction), "finish close-out")
                }
                Phase::Steady => {
                    let headroom = if predicted_ratio > STEADY_HEADROOM_OVERRIDE_RATIO {
                        1.0
                    } else {
                        coefficients(Phase::Steady).headroom
                    };
                    (Some(required_speed * headroom * pid_output), "steady")
                }
                Phase::Catch => {
                    if required_speed > CATCH_RELEASE_MULTIPLIER * adjusted_target {
                        (None, "underspeed release")
                    } else {
                        let headroom = coefficients(Phase::Catch).headroom;
                        (Some(required_speed * headroom * pid_output), "catch")
                    }
                }
                Phase::Warmup => {
                    if progress >= WARMUP_PROGRESS_DONE {
                        (Some(MIN_LIMIT as f64), "warmup complete")
                    } else if progress >= WARMUP_PROGRESS_HIGH {
                        (Some(required_speed * WARMUP_HIGH_MULTIPLIER * pid_output), "warmup ramp")
                    } else if progress >= WARMUP_PROGRESS_MID {
                        (Some(required_speed * WARMUP_MID_MULTIPLIER), "warmup ramp")
                    } else {
                        (None, "preheat")
                    }
                }
            }
        };
        if raw.is_none() {
            reason = if inputs.time_left <= 0.0 {
                "reporting"
            } else if matches!(inputs.phase, Phase::Catch) {
                "underspeed release"
            } else {
                "preheat"
            };
        }

        let quantized = raw.and_then(|v| {
            if v <= 0.0 {
                None
            } else {
                Some(quantize(v, inputs.phase, current_speed, adjusted_target, inputs.trend))
            }
        });

        let smoothed = self.smooth(quantized, inputs.phase);

        let ceiling_applied = match smoothed {
            None if inputs.physical_ceiling > 0.0 => Some(inputs.physical_ceiling as i64),
            other => other,
        };

        let mut final_limit = ceiling_applied;
        if progress >= OVERSHOOT_PROGRESS_THRESHOLD && current_speed > OVERSHOOT_SPEED_MULTIPLIER * adjusted_target {
            final_limit = Some((OVERSHOOT_FORCE_MULTIPLIER * adjusted_target).floor() as i64);
            reason = "protect";
        }

        if inputs.real_avg_speed > SPEED_LIMIT * (1.0 + OVERSPEED_BRAKE_MARGIN) {
            final_limit = Some(MIN_LIMIT);
            reason = "overspeed brake";
            self.smoothed = final_limit;
        }

        RateLimitOutput { limit: final_limit.unwrap_or(-1), reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs() -> RateLimitInputs {
        RateLimitInputs {
            target_bytes_per_sec: 50_000.0,
            precision_adjustment: 1.0,
            uploaded_in_cycle: 0.0,
            time_left: 1800.0,
            elapsed: 0.0,
            phase: Phase::Warmup,
            now: 1_700_000_000.0,
            kalman_speed: 0.0,
            predicted_upload_remaining: 0.0,
            weighted_window_speed: 0.0,
            trend: 0.0,
            physical_ceiling: 0.0,
            real_avg_speed: 0.0,
        }
    }

    #[test]
    fn warmup_under_upload_is_unlimited() {
        let mut rc = RateController::new();
        let out = rc.calculate(&base_inputs());
        assert_eq!(out.limit, -1);
        assert_eq!(out.reason, "preheat");
    }

    #[test]
    fn time_left_zero_is_reporting() {
        let mut rc = RateController::new();
        let mut inputs = base_inputs();
        inputs.time_left = 0.0;
        let out = rc.calculate(&inputs);
        assert_eq!(out.limit, -1);
        assert_eq!(out.reason, "reporting");
    }

    #[test]
    fn catch_releases_on_underspeed() {
        let mut rc = RateController::new();
        let mut inputs = base_inputs();
        inputs.phase = Phase::Catch;
        inputs.time_left = 10.0;
        inputs.uploaded_in_cycle = 0.0;
        inputs.target_bytes_per_sec = 1_000_000_000.0;
        let out = rc.calculate(&inputs);
        assert_eq!(out.limit, -1);
        assert_eq!(out.reason, "underspeed release");
    }

    #[test]
    fn overspeed_brake_forces_min_limit() {
        let mut rc = RateController::new();
        let mut inputs = base_inputs();
        inputs.real_avg_speed = SPEED_LIMIT * 1.2;
        let out = rc.calculate(&inputs);
        assert_eq!(out.limit, MIN_LIMIT);
        assert_eq!(out.reason, "overspeed brake");
    }

    #[test]
    fn physical_ceiling_replaces_unlimited() {
        let mut rc = RateController::new();
        let mut inputs = base_inputs();
        inputs.physical_ceiling = 99_999.0;
        let out = rc.calculate(&inputs);
        assert_eq!(out.limit, 99_999);
    }

    #[test]
    fn steady_on_target_yields_finite_limit() {
        let mut rc = RateController::new();
        let mut inputs = base_inputs();
        inputs.phase = Phase::Steady;
        inputs.elapsed = 900.0;
        inputs.time_left = 900.0;
        inputs.uploaded_in_cycle = 50_176.0 * 900.0;
        inputs.kalman_speed = 50_176.0;
        inputs.target_bytes_per_sec = 50_176.0;
        let out = rc.calculate(&inputs);
        assert!(out.limit >= MIN_LIMIT || out.limit == -1);
    }

    #[test]
    fn overshoot_guard_clamps_when_far_ahead() {
        let mut rc = RateController::new();
        let mut inputs = base_inputs();
        inputs.phase = Phase::Steady;
        inputs.elapsed = 1000.0;
        inputs.time_left = 10.0;
        inputs.target_bytes_per_sec = 1000.0;
        inputs.uploaded_in_cycle = 1000.0 * 1010.0 * 0.95;
        inputs.kalman_speed = 1000.0 * 3.0;
        let out = rc.calculate(&inputs);
        assert_eq!(out.reason, "protect");
        assert_eq!(out.limit, (OVERSHOOT_FORCE_MULTIPLIER * 1000.0).floor() as i64);
    }
}
