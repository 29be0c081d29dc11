//! Secondary controller that throttles download speed when the per-cycle
//! average upload threatens to exceed the hard ceiling.
//!
//! Grounded on the original program's `logic.py::DownloadLimiter`.

use crate::constants::{
    DL_LIMIT_ADJUST_BUFFER, DL_LIMIT_BUFFER, DL_LIMIT_GROWTH_FACTOR, DL_LIMIT_MAX, DL_LIMIT_MIN,
    DL_LIMIT_MIN_ELAPSED, DL_LIMIT_MIN_TIME, DL_LIMIT_SHRINK_FACTOR, SPEED_LIMIT,
};
use crate::util::safe_div;

/// Outcome of one download-limiter evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DownloadLimitDecision {
    /// No change; caller should leave the current limit (if any) in place.
    Hold,
    /// Lift any active download limit.
    Release,
    /// Apply `bytes_per_sec` as the new download limit, with `reason`.
    Apply {
        /// New download limit, bytes/s.
        bytes_per_sec: i64,
        /// Short machine-readable reason string.
        reason: &'static str,
    },
}

/// Evaluates the download limiter for one tick.
///
/// `this_up`/`this_time` are the cycle's uploaded bytes and elapsed
/// seconds; `remote_eta` is the client-reported seconds-to-complete for the
/// download (`None` if unknown); `upload_limited` reports whether the
/// upload side currently has an active cap; `remaining` is bytes left to
/// download; `current_dl_limit` is the currently applied download limit in
/// bytes/s (`-1` if none); `measured_dl_speed` is the torrent's currently
/// observed download speed, bytes/s.
#[must_use]
pub fn evaluate(
    this_up: f64,
    this_time: f64,
    remote_eta: Option<f64>,
    upload_limited: bool,
    remaining: f64,
    current_dl_limit: i64,
    measured_dl_speed: f64,
) -> DownloadLimitDecision {
    if this_time < DL_LIMIT_MIN_ELAPSED {
        return DownloadLimitDecision::Hold;
    }

    let avg_speed = safe_div(this_up, this_time, 0.0);
    let has_limit = current_dl_limit > 0;

    if avg_speed <= SPEED_LIMIT {
        return if has_limit { DownloadLimitDecision::Release } else { DownloadLimitDecision::Hold };
    }

    if remaining <= 0.0 {
        return if has_limit { DownloadLimitDecision::Release } else { DownloadLimitDecision::Hold };
    }

    if !has_limit {
        let min_time = if upload_limited { DL_LIMIT_MIN_TIME * 2.0 } else { DL_LIMIT_MIN_TIME };
        let eta_qualifies = matches!(remote_eta, Some(eta) if eta > 0.0 && eta <= min_time);
        if !eta_qualifies {
            return DownloadLimitDecision::Hold;
        }

        let denominator = this_up / SPEED_LIMIT - this_time + DL_LIMIT_BUFFER;
        if denominator <= 0.0 {
            return DownloadLimitDecision::Apply {
                bytes_per_sec: DL_LIMIT_MIN as i64,
                reason: "severe overspeed",
            };
        }
        let dl = (remaining / denominator).max(DL_LIMIT_MIN);
        return DownloadLimitDecision::Apply { bytes_per_sec: dl as i64, reason: "initial cap" };
    }

    // An active limit exists and average is still above ceiling.
    if measured_dl_speed < 2.0 * current_dl_limit as f64 {
        let denominator = this_up / SPEED_LIMIT - this_time + DL_LIMIT_ADJUST_BUFFER;
        let mut new_limit = if denominator <= 0.0 {
            DL_LIMIT_MIN
        } else {
            (remaining / denominator).max(DL_LIMIT_MIN)
        };
        new_limit = new_limit.min(DL_LIMIT_MAX);
        let growth_cap = current_dl_limit as f64 * DL_LIMIT_GROWTH_FACTOR;
        let shrink_floor = current_dl_limit as f64 / DL_LIMIT_SHRINK_FACTOR;
        new_limit = new_limit.min(growth_cap).max(shrink_floor).max(DL_LIMIT_MIN);
        return DownloadLimitDecision::Apply { bytes_per_sec: new_limit as i64, reason: "adjust" };
    }

    DownloadLimitDecision::Hold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_before_minimum_elapsed() {
        let decision = evaluate(1000.0, 1.0, Some(5.0), false, 1_000_000.0, -1, 0.0);
        assert_eq!(decision, DownloadLimitDecision::Hold);
    }

    #[test]
    fn releases_existing_limit_when_recovered() {
        let decision = evaluate(10.0, 100.0, None, false, 1_000_000.0, 600_000, 100.0);
        assert_eq!(decision, DownloadLimitDecision::Release);
    }

    #[test]
    fn holds_when_under_ceiling_and_no_limit() {
        let decision = evaluate(10.0, 100.0, None, false, 1_000_000.0, -1, 0.0);
        assert_eq!(decision, DownloadLimitDecision::Hold);
    }

    #[test]
    fn applies_minimum_on_severe_overspeed() {
        let this_up = SPEED_LIMIT * 1000.0; // huge overspeed, denominator collapses
        let decision = evaluate(this_up, 100.0, Some(5.0), false, 1_000_000.0, -1, 0.0);
        match decision {
            DownloadLimitDecision::Apply { bytes_per_sec, reason } => {
                assert_eq!(bytes_per_sec, DL_LIMIT_MIN as i64);
                assert_eq!(reason, "severe overspeed");
            }
            other => panic!("expected Apply, got {other:?}"),
        }
    }

    #[test]
    fn never_below_minimum() {
        let decision = evaluate(SPEED_LIMIT * 2.0, 100.0, Some(5.0), false, 10.0, -1, 0.0);
        if let DownloadLimitDecision::Apply { bytes_per_sec, .. } = decision {
            assert!(bytes_per_sec >= DL_LIMIT_MIN as i64);
        }
    }

    #[test]
    fn releases_active_limit_once_download_completes() {
        let this_up = SPEED_LIMIT * 2.0; // still above ceiling
        let decision = evaluate(this_up, 100.0, Some(5.0), false, 0.0, 600_000, 100.0);
        assert_eq!(decision, DownloadLimitDecision::Release);
    }

    #[test]
    fn holds_when_download_complete_and_no_limit_active() {
        let this_up = SPEED_LIMIT * 2.0;
        let decision = evaluate(this_up, 100.0, Some(5.0), false, -1.0, -1, 0.0);
        assert_eq!(decision, DownloadLimitDecision::Hold);
    }
}
