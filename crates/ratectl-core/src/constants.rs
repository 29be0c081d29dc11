//! Numeric constants shared by every rate-control component.
//!
//! Grounded on the original program's `consts.py`; values are not tunable at
//! runtime, matching the source.

/// Kalman filter process noise for the speed state.
pub const KALMAN_Q_SPEED: f64 = 0.1;
/// Kalman filter process noise for the acceleration state.
pub const KALMAN_Q_ACCEL: f64 = 0.05;
/// Kalman filter measurement noise.
pub const KALMAN_R: f64 = 0.5;
/// Initial diagonal covariance on the first Kalman sample.
pub const KALMAN_INITIAL_COVARIANCE: f64 = 1000.0;
/// Minimum time delta accepted by the Kalman update step.
pub const KALMAN_MIN_DT: f64 = 0.01;

/// Speed-averager window widths, seconds.
pub const SPEED_WINDOWS: [u64; 4] = [5, 15, 30, 60];
/// Maximum timestamped speed samples retained per torrent.
pub const SPEED_RING_CAPACITY: usize = 1200;
/// Maximum timestamped session samples retained per torrent.
pub const SESSION_RING_CAPACITY: usize = 600;
/// Window, in seconds, used to derive the short-term speed trend.
pub const TREND_WINDOW_SECONDS: f64 = 10.0;
/// Minimum sample count required to compute a trend.
pub const TREND_MIN_SAMPLES: usize = 5;

/// PID integral clamp.
pub const PID_INTEGRAL_CLAMP: f64 = 0.3;
/// PID derivative low-pass filter weight for the new sample.
pub const PID_DERIVATIVE_ALPHA_NEW: f64 = 0.3;
/// PID derivative low-pass filter weight for the previous sample.
pub const PID_DERIVATIVE_ALPHA_OLD: f64 = 0.7;
/// Lower clamp applied to the PID multiplicative output.
pub const PID_OUTPUT_MIN: f64 = 0.5;
/// Upper clamp applied to the PID multiplicative output.
pub const PID_OUTPUT_MAX: f64 = 2.0;
/// Minimum time delta accepted by the PID update step.
pub const PID_MIN_DT: f64 = 0.01;

/// Floor applied to every quantised (and most non-quantised) limit value.
pub const MIN_LIMIT: i64 = 4096;
/// Lower clamp on the quantiser's adaptive step.
pub const QUANTIZER_STEP_MIN: i64 = 256;
/// Upper clamp on the quantiser's adaptive step.
pub const QUANTIZER_STEP_MAX: i64 = 8192;
/// Fixed step used in the `finish` phase.
pub const QUANTIZER_FINISH_STEP: i64 = 256;
/// Trend magnitude above which the quantiser step is halved.
pub const QUANTIZER_TREND_THRESHOLD: f64 = 0.1;

/// Bounded history length for the process-wide precision tracker.
pub const PRECISION_HISTORY_CAPACITY: usize = 30;
/// Minimum history size before any adjustment is recomputed.
pub const PRECISION_MIN_SAMPLES: usize = 5;
/// Minimum per-phase sample count before a phase adjustment is recomputed.
pub const PRECISION_MIN_PHASE_SAMPLES: usize = 3;
/// Clamp bounds for the per-phase precision adjustment.
pub const PRECISION_PHASE_ADJ_MIN: f64 = 0.92;
/// See [`PRECISION_PHASE_ADJ_MIN`].
pub const PRECISION_PHASE_ADJ_MAX: f64 = 1.08;
/// Clamp bounds for the global precision adjustment.
pub const PRECISION_GLOBAL_ADJ_MIN: f64 = 0.95;
/// See [`PRECISION_GLOBAL_ADJ_MIN`].
pub const PRECISION_GLOBAL_ADJ_MAX: f64 = 1.05;

/// Seconds classified as the `finish` phase boundary.
pub const FINISH_TIME: f64 = 30.0;
/// Seconds classified as the `steady` phase boundary.
pub const STEADY_TIME: f64 = 120.0;
/// Upward jump in time-to-next-announce, seconds, that signals cycle rollover.
pub const CYCLE_JUMP_THRESHOLD: f64 = 30.0;

/// Hard per-cycle upload ceiling the download limiter and reannounce
/// optimiser protect (bytes/s): 50 MiB/s.
pub const SPEED_LIMIT: f64 = 50.0 * 1024.0 * 1024.0;

/// Download limiter: minimum elapsed cycle time before any action.
pub const DL_LIMIT_MIN_ELAPSED: f64 = 2.0;
/// Download limiter: base remote-eta threshold, seconds.
pub const DL_LIMIT_MIN_TIME: f64 = 20.0;
/// Download limiter: denominator buffer for the initial cap.
pub const DL_LIMIT_BUFFER: f64 = 30.0;
/// Download limiter: denominator buffer when adjusting an active cap.
pub const DL_LIMIT_ADJUST_BUFFER: f64 = 60.0;
/// Download limiter: minimum cap, bytes/s (512 KiB/s).
pub const DL_LIMIT_MIN: f64 = 512.0 * 1024.0;
/// Download limiter: absolute cap on a recomputed limit, bytes/s.
pub const DL_LIMIT_MAX: f64 = 512_000.0 * 1024.0;
/// Download limiter: maximum growth factor applied per adjustment.
pub const DL_LIMIT_GROWTH_FACTOR: f64 = 1.5;
/// Download limiter: maximum shrink factor applied per adjustment.
pub const DL_LIMIT_SHRINK_FACTOR: f64 = 1.5;

/// Reannounce optimiser: minimum elapsed cycle time before any action.
pub const REANNOUNCE_MIN_ELAPSED: f64 = 30.0;
/// Reannounce optimiser: cooldown between successive forced announces.
pub const REANNOUNCE_MIN_INTERVAL: f64 = 900.0;
/// Reannounce optimiser: window used to average session speed, seconds.
pub const REANNOUNCE_SPEED_SAMPLES: f64 = 300.0;
/// Reannounce optimiser: upload cap applied while waiting, bytes/s (5120 KiB/s).
pub const REANNOUNCE_WAIT_LIMIT: f64 = 5120.0 * 1024.0;
/// Reannounce optimiser: slack window before `perfect_time`, seconds.
pub const REANNOUNCE_WAIT_WINDOW: f64 = 60.0;
/// Reannounce optimiser: throughput used to bound the earliest legal time.
pub const REANNOUNCE_DRAIN_RATE: f64 = 45.0 * 1024.0 * 1024.0;

/// Announce interval for torrents younger than 7 days.
pub const ANNOUNCE_INTERVAL_NEW: f64 = 1800.0;
/// Announce interval for torrents younger than 30 days.
pub const ANNOUNCE_INTERVAL_WEEK: f64 = 2700.0;
/// Announce interval for torrents 30 days or older.
pub const ANNOUNCE_INTERVAL_OLD: f64 = 3600.0;
/// Age threshold, seconds, separating "new" from "week" torrents.
pub const ANNOUNCE_AGE_NEW_SECONDS: f64 = 7.0 * 86_400.0;
/// Age threshold, seconds, separating "week" from "old" torrents.
pub const ANNOUNCE_AGE_WEEK_SECONDS: f64 = 30.0 * 86_400.0;

/// Cached remote time-to-next-announce TTL, seconds, by phase.
pub const PROPERTIES_TTL_FINISH: f64 = 0.2;
/// See [`PROPERTIES_TTL_FINISH`].
pub const PROPERTIES_TTL_STEADY: f64 = 0.5;
/// See [`PROPERTIES_TTL_FINISH`].
pub const PROPERTIES_TTL_CATCH: f64 = 1.0;
/// See [`PROPERTIES_TTL_FINISH`].
pub const PROPERTIES_TTL_WARMUP: f64 = 2.0;

/// Smoothing: relative change below which a new limit is accepted as-is.
pub const SMOOTH_ACCEPT_THRESHOLD: f64 = 0.20;
/// Smoothing: relative change above which a 1/2 blend is used.
pub const SMOOTH_HALF_BLEND_THRESHOLD: f64 = 0.50;
/// Smoothing: blend weight applied to the new value in the 1/2 blend band.
pub const SMOOTH_HALF_BLEND_WEIGHT: f64 = 0.5;
/// Smoothing: blend weight applied to the new value in the default band.
pub const SMOOTH_DEFAULT_BLEND_WEIGHT: f64 = 0.3;

/// Overshoot guard: cycle progress threshold.
pub const OVERSHOOT_PROGRESS_THRESHOLD: f64 = 0.90;
/// Overshoot guard: speed-over-target multiplier threshold.
pub const OVERSHOOT_SPEED_MULTIPLIER: f64 = 2.5;
/// Overshoot guard: forced limit multiplier.
pub const OVERSHOOT_FORCE_MULTIPLIER: f64 = 1.3;

/// Overspeed brake: fraction above [`SPEED_LIMIT`] that trips the brake.
pub const OVERSPEED_BRAKE_MARGIN: f64 = 0.05;

/// Warmup phase: progress at/above which the limit is forced to [`MIN_LIMIT`].
pub const WARMUP_PROGRESS_DONE: f64 = 1.0;
/// Warmup phase: progress threshold for the 1.01x headroom branch.
pub const WARMUP_PROGRESS_HIGH: f64 = 0.8;
/// Warmup phase: multiplier applied in the high-progress branch.
pub const WARMUP_HIGH_MULTIPLIER: f64 = 1.01;
/// Warmup phase: progress threshold for the 1.05x headroom branch.
pub const WARMUP_PROGRESS_MID: f64 = 0.5;
/// Warmup phase: multiplier applied in the mid-progress branch.
pub const WARMUP_MID_MULTIPLIER: f64 = 1.05;

/// Catch phase: required-speed multiplier above which the limit is released.
pub const CATCH_RELEASE_MULTIPLIER: f64 = 5.0;

/// Finish phase: predicted-ratio deviation used to compute the correction.
pub const FINISH_OVER_THRESHOLD: f64 = 1.002;
/// Finish phase: predicted-ratio deviation used to compute the correction.
pub const FINISH_UNDER_THRESHOLD: f64 = 0.998;
/// Finish phase: gain applied to the predicted-ratio deviation.
pub const FINISH_CORRECTION_GAIN: f64 = 3.0;
/// Finish phase: lower clamp on the correction factor.
pub const FINISH_CORRECTION_MIN: f64 = 0.8;

/// Steady phase: predicted-ratio above which headroom collapses to 1.0.
pub const STEADY_HEADROOM_OVERRIDE_RATIO: f64 = 1.01;

/// Interval, seconds, between persistence snapshots.
pub const DB_SAVE_INTERVAL: f64 = 180.0;

/// Success-cycle threshold for aggregate stats (ratio ≥ this value).
pub const STATS_SUCCESS_RATIO: f64 = 0.95;
/// Precision-cycle threshold for aggregate stats (|ratio − 1| ≤ this value).
pub const STATS_PRECISION_TOLERANCE: f64 = 0.001;

/// Client reconnect back-off schedule, seconds.
pub const RECONNECT_BACKOFF: [u64; 5] = [1, 2, 4, 8, 16];
/// Maximum reconnect attempts before giving up.
pub const RECONNECT_MAX_ATTEMPTS: usize = 5;

/// Coordinator adaptive sleep table: (time-left ceiling, sleep seconds).
pub const ADAPTIVE_SLEEP_TABLE: [(f64, f64); 5] =
    [(5.0, 0.15), (15.0, 0.25), (30.0, 0.4), (90.0, 0.8), (f64::INFINITY, 1.5)];
/// Floor applied to the coordinator's adaptive sleep duration.
pub const ADAPTIVE_SLEEP_MIN: f64 = 0.1;

/// Tolerance, seconds, used when comparing floating wall-clock divisors to zero.
pub const SAFE_DIV_EPSILON: f64 = 1e-10;
