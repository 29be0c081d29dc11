//! Per-phase PID corrector over cumulative upload vs target.
//!
//! Grounded on the original program's `algorithms.py::PIDController`.

use crate::constants::{
    PID_DERIVATIVE_ALPHA_NEW, PID_DERIVATIVE_ALPHA_OLD, PID_INTEGRAL_CLAMP, PID_MIN_DT,
    PID_OUTPUT_MAX, PID_OUTPUT_MIN,
};
use crate::phase::Phase;
use crate::util::{clamp, safe_div};

/// Kp, Ki, Kd, headroom for a phase.
#[derive(Debug, Clone, Copy)]
pub struct PidCoefficients {
    /// Proportional gain.
    pub kp: f64,
    /// Integral gain.
    pub ki: f64,
    /// Derivative gain.
    pub kd: f64,
    /// Phase headroom multiplier consumed by the rate controller.
    pub headroom: f64,
}

/// Looks up the coefficients for a phase.
#[must_use]
pub fn coefficients(phase: Phase) -> PidCoefficients {
    match phase {
        Phase::Warmup => PidCoefficients { kp: 0.3, ki: 0.05, kd: 0.02, headroom: 1.03 },
        Phase::Catch => PidCoefficients { kp: 0.5, ki: 0.10, kd: 0.05, headroom: 1.02 },
        Phase::Steady => PidCoefficients { kp: 0.6, ki: 0.15, kd: 0.08, headroom: 1.005 },
        Phase::Finish => PidCoefficients { kp: 0.8, ki: 0.20, kd: 0.12, headroom: 1.001 },
    }
}

/// A phase-aware PID controller over normalised cumulative-upload error.
#[derive(Debug, Clone, Default)]
pub struct PidController {
    integral: f64,
    prev_error: Option<f64>,
    prev_derivative: f64,
    last_update: Option<f64>,
    last_output: f64,
    seeded: bool,
}

impl PidController {
    /// Builds a fresh controller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one update. `setpoint`/`measured` are cumulative bytes for the
    /// cycle; `phase` selects the coefficients; `now` is the wall clock.
    pub fn update(&mut self, setpoint: f64, measured: f64, phase: Phase, now: f64) -> f64 {
        let coeffs = coefficients(phase);

        let Some(last) = self.last_update else {
            self.last_update = Some(now);
            self.prev_error = Some(safe_div(setpoint - measured, setpoint.max(1.0), 0.0));
            self.last_output = 1.0;
            self.seeded = true;
            return self.last_output;
        };

        let dt = now - last;
        if dt <= PID_MIN_DT {
            return self.last_output;
        }

        let error = safe_div(setpoint - measured, setpoint.max(1.0), 0.0);

        self.integral = clamp(self.integral + error * dt, -PID_INTEGRAL_CLAMP, PID_INTEGRAL_CLAMP);

        let raw_derivative = match self.prev_error {
            Some(prev) => safe_div(error - prev, dt, 0.0),
            None => 0.0,
        };
        let derivative = PID_DERIVATIVE_ALPHA_NEW * raw_derivative
            + PID_DERIVATIVE_ALPHA_OLD * self.prev_derivative;

        let output = 1.0 + coeffs.kp * error + coeffs.ki * self.integral + coeffs.kd * derivative;
        let output = clamp(output, PID_OUTPUT_MIN, PID_OUTPUT_MAX);

        self.prev_error = Some(error);
        self.prev_derivative = derivative;
        self.last_update = Some(now);
        self.last_output = output;
        output
    }

    /// Resets all internal state, forcing the next [`update`](Self::update)
    /// call to reseed.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Whether at least one update has seeded the controller.
    #[must_use]
    pub const fn is_seeded(&self) -> bool {
        self.seeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_seeds_output_at_one() {
        let mut pid = PidController::new();
        let out = pid.update(1000.0, 0.0, Phase::Steady, 0.0);
        assert_eq!(out, 1.0);
    }

    #[test]
    fn zero_dt_returns_previous_output() {
        let mut pid = PidController::new();
        pid.update(1000.0, 0.0, Phase::Steady, 0.0);
        let second = pid.update(1000.0, 500.0, Phase::Steady, 1.0);
        let unchanged = pid.update(1000.0, 999.0, Phase::Steady, 1.0);
        assert_eq!(unchanged, second);
    }

    #[test]
    fn output_always_clamped() {
        let mut pid = PidController::new();
        pid.update(1000.0, 0.0, Phase::Finish, 0.0);
        for i in 1..50 {
            let out = pid.update(1000.0, -10_000.0, Phase::Finish, i as f64);
            assert!(out >= PID_OUTPUT_MIN && out <= PID_OUTPUT_MAX);
        }
    }

    #[test]
    fn underupload_pushes_output_above_one() {
        let mut pid = PidController::new();
        pid.update(1000.0, 0.0, Phase::Steady, 0.0);
        let out = pid.update(1000.0, 100.0, Phase::Steady, 5.0);
        assert!(out > 1.0);
    }
}
