//! Decides when to force a tracker announce so the next announcement
//! captures the maximum legal upload.
//!
//! Grounded on the original program's `logic.py::ReannounceOptimizer`.

use crate::constants::{
    REANNOUNCE_DRAIN_RATE, REANNOUNCE_MIN_ELAPSED, REANNOUNCE_MIN_INTERVAL, REANNOUNCE_WAIT_LIMIT,
    REANNOUNCE_WAIT_WINDOW, SPEED_LIMIT,
};
use crate::util::safe_div;

/// Outcome of one reannounce-optimiser evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReannounceDecision {
    /// No action this tick.
    None,
    /// Enter (or remain in) the waiting-for-reannounce latched state.
    StartWaiting,
    /// Fire the forced announce now, with `reason`.
    Fire {
        /// Short machine-readable reason string.
        reason: &'static str,
    },
}

/// Evaluates whether a forced announce should fire or be scheduled.
///
/// `this_up`/`this_time` are the cycle's uploaded bytes and elapsed
/// seconds; `avg_up`/`avg_dl` are the 300 s session averages; `remaining`
/// is bytes left to download; `announce_interval` is the estimated
/// tracker announce interval for this torrent; `last_reannounce_age` is
/// seconds since the last fire (`f64::INFINITY` if never fired).
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn evaluate(
    this_up: f64,
    this_time: f64,
    avg_up: f64,
    avg_dl: f64,
    remaining: f64,
    announce_interval: f64,
    last_reannounce_age: f64,
    now: f64,
) -> ReannounceDecision {
    if last_reannounce_age < REANNOUNCE_MIN_INTERVAL {
        return ReannounceDecision::None;
    }
    if this_time < REANNOUNCE_MIN_ELAPSED {
        return ReannounceDecision::None;
    }
    if avg_up <= SPEED_LIMIT || avg_dl <= 0.0 {
        return ReannounceDecision::None;
    }
    if remaining <= 0.0 {
        return ReannounceDecision::None;
    }

    let complete_time = safe_div(remaining, avg_dl, 0.0) + now;
    let perfect_time = complete_time - announce_interval * SPEED_LIMIT / avg_up;

    let cycle_pace = safe_div(this_up, this_time, 0.0);
    let earliest = if cycle_pace > SPEED_LIMIT {
        (this_up - SPEED_LIMIT * this_time) / REANNOUNCE_DRAIN_RATE + now
    } else {
        now
    };

    if earliest - (now - this_time) < REANNOUNCE_MIN_INTERVAL {
        return ReannounceDecision::None;
    }

    // Mirrors the original's nested structure: the wait branch is only
    // reachable once `earliest` has actually overtaken `perfect_time`, not
    // independently of it.
    if earliest > perfect_time {
        if now >= earliest {
            if cycle_pace > SPEED_LIMIT {
                return ReannounceDecision::Fire { reason: "optimised announce" };
            }
        } else if earliest < perfect_time + REANNOUNCE_WAIT_WINDOW {
            return ReannounceDecision::StartWaiting;
        }
    }

    ReannounceDecision::None
}

/// While [`ReannounceDecision::StartWaiting`] is latched, checks whether
/// the waiting period should end in a fire ("average recovered") or
/// continue.
#[must_use]
pub fn check_waiting(this_time: f64, avg_speed: f64) -> bool {
    this_time >= REANNOUNCE_MIN_INTERVAL && avg_speed < SPEED_LIMIT
}

/// Upload cap applied while in the waiting-for-reannounce state.
#[must_use]
pub const fn wait_limit() -> f64 {
    REANNOUNCE_WAIT_LIMIT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_blocks_consecutive_fires() {
        let decision = evaluate(
            SPEED_LIMIT * 60.0,
            60.0,
            SPEED_LIMIT * 1.2,
            SPEED_LIMIT * 0.4,
            20.0 * 1024.0 * 1024.0 * 1024.0,
            1800.0,
            100.0,
            2_000_000.0,
        );
        assert_eq!(decision, ReannounceDecision::None);
    }

    #[test]
    fn no_action_when_under_ceiling() {
        let decision = evaluate(
            1000.0, 60.0, SPEED_LIMIT * 0.5, SPEED_LIMIT * 0.4, 1_000_000.0, 1800.0,
            f64::INFINITY, 2_000_000.0,
        );
        assert_eq!(decision, ReannounceDecision::None);
    }

    #[test]
    fn waiting_ends_once_time_and_speed_conditions_met() {
        assert!(check_waiting(1000.0, SPEED_LIMIT * 0.5));
        assert!(!check_waiting(100.0, SPEED_LIMIT * 0.5));
        assert!(!check_waiting(1000.0, SPEED_LIMIT * 1.5));
    }

    #[test]
    fn wait_limit_matches_spec_constant() {
        assert_eq!(wait_limit(), 5120.0 * 1024.0);
    }

    #[test]
    fn no_wait_when_cycle_pace_under_ceiling_even_if_near_perfect_time() {
        // cycle_pace <= SPEED_LIMIT forces earliest == now, which sits far
        // below perfect_time here. The nested structure must not latch a
        // wait just because `earliest < perfect_time + window` holds on its
        // own.
        let now = 2_000_000.0;
        let this_time = 1000.0;
        let this_up = 0.9 * SPEED_LIMIT * this_time;
        let decision = evaluate(
            this_up,
            this_time,
            SPEED_LIMIT * 1.2,
            SPEED_LIMIT * 0.4,
            20.0 * 1024.0 * 1024.0 * 1024.0,
            60.0,
            f64::INFINITY,
            now,
        );
        assert_eq!(decision, ReannounceDecision::None);
    }

    #[test]
    fn waiting_latches_only_when_earliest_exceeds_perfect_time_and_now_precedes_it() {
        let now = 2_000_000.0;
        let this_time = 1000.0;
        let avg_up = SPEED_LIMIT * 1.2;
        let avg_dl = SPEED_LIMIT * 0.4;
        let announce_interval = 900.0;
        let cycle_pace = SPEED_LIMIT * 1.5;
        let this_up = cycle_pace * this_time;

        let earliest_offset = (this_up - SPEED_LIMIT * this_time) / REANNOUNCE_DRAIN_RATE;
        let target_perfect_offset = earliest_offset - 30.0;
        let complete_offset = target_perfect_offset + announce_interval * SPEED_LIMIT / avg_up;
        let remaining = complete_offset * avg_dl;

        let decision = evaluate(
            this_up,
            this_time,
            avg_up,
            avg_dl,
            remaining,
            announce_interval,
            f64::INFINITY,
            now,
        );
        assert_eq!(decision, ReannounceDecision::StartWaiting);
    }

    #[test]
    fn no_action_when_download_already_complete() {
        let decision = evaluate(
            SPEED_LIMIT * 90.0,
            60.0,
            SPEED_LIMIT * 1.2,
            SPEED_LIMIT * 0.4,
            0.0,
            1800.0,
            f64::INFINITY,
            2_000_000.0,
        );
        assert_eq!(decision, ReannounceDecision::None);
    }
}
