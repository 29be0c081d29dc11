//! Safe arithmetic and formatting helpers.
//!
//! Grounded on the original program's `utils.py`.

use crate::constants::SAFE_DIV_EPSILON;

/// Divides `num` by `den`, returning `default` when `den` is within
/// [`SAFE_DIV_EPSILON`] of zero.
#[must_use]
pub fn safe_div(num: f64, den: f64, default: f64) -> f64 {
    if den.abs() < SAFE_DIV_EPSILON {
        default
    } else {
        num / den
    }
}

/// Clamps `value` to `[lo, hi]`.
#[must_use]
pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}

/// Rounds `value / step` to the nearest integer and multiplies back by
/// `step`, using `floor((x + step/2) / step) * step`.
#[must_use]
pub fn round_to_step(value: f64, step: i64) -> i64 {
    if step <= 0 {
        return value.round() as i64;
    }
    let step_f = step as f64;
    (((value + step_f / 2.0) / step_f).floor() as i64) * step
}

/// Formats a byte count as a human-readable size (`KiB`/`MiB`/`GiB`/`TiB`).
#[must_use]
pub fn fmt_size(bytes: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes;
    let mut unit = 0usize;
    while value.abs() >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

/// Formats a bytes/s rate as a human-readable speed.
#[must_use]
pub fn fmt_speed(bytes_per_sec: f64) -> String {
    format!("{}/s", fmt_size(bytes_per_sec))
}

/// Formats a duration in seconds as `Hh Mm Ss`-style text.
#[must_use]
pub fn fmt_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as i64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_div_guards_zero() {
        assert_eq!(safe_div(10.0, 0.0, -1.0), -1.0);
        assert_eq!(safe_div(10.0, 5.0, -1.0), 2.0);
    }

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp(5.0, 0.0, 3.0), 3.0);
        assert_eq!(clamp(-5.0, 0.0, 3.0), 0.0);
        assert_eq!(clamp(1.0, 0.0, 3.0), 1.0);
    }

    #[test]
    fn round_to_step_nearest() {
        assert_eq!(round_to_step(1000.0, 512), 1024);
        assert_eq!(round_to_step(4096.0, 4096), 4096);
        assert_eq!(round_to_step(0.0, 256), 0);
    }

    #[test]
    fn fmt_size_scales() {
        assert_eq!(fmt_size(0.0), "0.00 B");
        assert_eq!(fmt_size(1024.0), "1.00 KiB");
        assert_eq!(fmt_size(1024.0 * 1024.0), "1.00 MiB");
    }

    #[test]
    fn fmt_duration_buckets() {
        assert_eq!(fmt_duration(5.0), "5s");
        assert_eq!(fmt_duration(65.0), "1m 5s");
        assert_eq!(fmt_duration(3661.0), "1h 1m 1s");
    }
}
