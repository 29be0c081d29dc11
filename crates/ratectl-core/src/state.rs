//! Per-torrent cycle lifecycle: phase classification, time-left tracking,
//! per-cycle counters.
//!
//! Grounded on the original program's `model.py::TorrentState` (and
//! `Stats` for the aggregate counters).

use crate::constants::{
    ANNOUNCE_AGE_NEW_SECONDS, ANNOUNCE_AGE_WEEK_SECONDS, ANNOUNCE_INTERVAL_NEW,
    ANNOUNCE_INTERVAL_OLD, ANNOUNCE_INTERVAL_WEEK, CYCLE_JUMP_THRESHOLD, PROPERTIES_TTL_CATCH,
    PROPERTIES_TTL_FINISH, PROPERTIES_TTL_STEADY, PROPERTIES_TTL_WARMUP, STATS_PRECISION_TOLERANCE,
    STATS_SUCCESS_RATIO,
};
use crate::phase::Phase;
use crate::rate_controller::RateController;
use crate::session::SessionTracker;
use crate::speed::{KalmanTracker, SpeedTracker};
use crate::util::safe_div;

/// One completed cycle's summary, emitted exactly once per rollover.
#[derive(Debug, Clone, Copy)]
pub struct CycleReport {
    /// Index of the cycle that just completed.
    pub cycle_index: u64,
    /// Cycle duration, seconds.
    pub elapsed: f64,
    /// Bytes uploaded during the cycle.
    pub uploaded_in_cycle: f64,
    /// Achieved / intended cumulative upload.
    pub ratio: f64,
    /// Phase the torrent was in when the cycle rolled over.
    pub phase: Phase,
}

/// Lifecycle + filter state tracked for one managed torrent.
#[derive(Debug, Clone)]
pub struct TorrentState {
    /// Torrent hash, the state's identity.
    pub hash: String,
    /// Display name, as last reported by the client.
    pub name: String,
    /// Total torrent size, bytes.
    pub total_size: u64,
    /// Wall time the torrent was added to the client.
    pub added_at: f64,
    /// Tracker-site external id, if resolved.
    pub external_id: Option<String>,
    /// Original publish time, if known; falls back to `added_at`.
    pub publish_time: Option<f64>,
    /// Free-form promotion tag (e.g. free-leech), if resolved.
    pub promotion: Option<String>,

    /// Monotonically non-decreasing cycle counter.
    pub cycle_index: u64,
    /// Wall time the current cycle started. `0.0` means uninitialised.
    pub cycle_start: f64,
    /// Cumulative uploaded bytes observed at cycle start.
    pub cycle_start_uploaded: u64,
    /// Whether two consecutive jumps have established a real cycle_interval.
    pub cycle_synced: bool,
    /// Measured interval between the last two cycle rollovers, seconds.
    pub cycle_interval: f64,
    /// Count of upward time-left jumps observed so far.
    pub jump_count: u64,
    /// Wall time of the previous jump (`0.0` if none yet).
    pub last_jump: f64,

    /// Wall time of the last (real or synthesised) announce.
    pub last_announce_time: Option<f64>,
    /// Last cached remote time-to-next-announce value.
    cached_tl: Option<f64>,
    /// Wall time the cached remote value was captured.
    cache_ts: f64,
    /// Previous tick's resolved time-left, used for jump detection.
    prev_tl: Option<f64>,

    /// Cumulative uploaded bytes observed at session start.
    pub total_uploaded_start: u64,
    /// Wall time the session (daemon's observation of this torrent) started.
    pub session_start_time: f64,

    /// Whether this cycle's report has already been emitted.
    pub report_sent: bool,
    /// Whether the download limiter has acted this cycle.
    pub dl_limited_this_cycle: bool,
    /// Whether a reannounce has already fired this cycle.
    pub reannounced_this_cycle: bool,
    /// Latched low-cap state while waiting for a planned reannounce.
    pub waiting_reannounce: bool,

    /// Last upload limit applied, bytes/s (`-1` = unlimited).
    pub last_up_limit: i64,
    /// Last download limit applied, bytes/s (`-1` = none).
    pub last_dl_limit: i64,
    /// Reason string accompanying the last upload limit change.
    pub last_up_reason: String,

    /// Embedded Kalman speed/acceleration filter, reset on cycle rollover.
    pub kalman: KalmanTracker,
    /// Embedded multi-window speed averager, reset on cycle rollover.
    pub speed_tracker: SpeedTracker,
    /// Embedded session sample ring, persists across cycle rollovers.
    pub session_tracker: SessionTracker,
    /// Embedded PID + smoothing state, reset on cycle rollover.
    pub rate_controller: RateController,
}

impl TorrentState {
    /// Creates state for a torrent observed for the first time.
    /// `added_at` is the torrent's own add time as reported by the client,
    /// not the daemon's local observation time.
    #[must_use]
    pub fn new(hash: impl Into<String>, name: impl Into<String>, total_size: u64, added_at: f64) -> Self {
        Self {
            hash: hash.into(),
            name: name.into(),
            total_size,
            added_at,
            external_id: None,
            publish_time: None,
            promotion: None,
            cycle_index: 0,
            cycle_start: 0.0,
            cycle_start_uploaded: 0,
            cycle_synced: false,
            cycle_interval: 0.0,
            jump_count: 0,
            last_jump: 0.0,
            last_announce_time: None,
            cached_tl: None,
            cache_ts: 0.0,
            prev_tl: None,
            total_uploaded_start: 0,
            session_start_time: 0.0,
            report_sent: false,
            dl_limited_this_cycle: false,
            reannounced_this_cycle: false,
            waiting_reannounce: false,
            last_up_limit: -1,
            last_dl_limit: -1,
            last_up_reason: String::new(),
            kalman: KalmanTracker::new(),
            speed_tracker: SpeedTracker::new(),
            session_tracker: SessionTracker::new(),
            rate_controller: RateController::new(),
        }
    }

    /// Whether this state has never completed a cycle-start pass.
    #[must_use]
    pub fn is_uninitialised(&self) -> bool {
        self.cycle_start == 0.0
    }

    /// Announce interval estimated from torrent age, per the glossary.
    #[must_use]
    pub fn announce_interval(&self, now: f64) -> f64 {
        let publish = self.publish_time.unwrap_or(self.added_at);
        let age = now - publish;
        if age < ANNOUNCE_AGE_NEW_SECONDS {
            ANNOUNCE_INTERVAL_NEW
        } else if age < ANNOUNCE_AGE_WEEK_SECONDS {
            ANNOUNCE_INTERVAL_WEEK
        } else {
            ANNOUNCE_INTERVAL_OLD
        }
    }

    /// TTL for the cached remote time-left value, keyed by the phase the
    /// torrent was last classified into.
    fn remote_ttl(phase: Phase) -> f64 {
        match phase {
            Phase::Finish => PROPERTIES_TTL_FINISH,
            Phase::Steady => PROPERTIES_TTL_STEADY,
            Phase::Catch => PROPERTIES_TTL_CATCH,
            Phase::Warmup => PROPERTIES_TTL_WARMUP,
        }
    }

    /// Current time-to-next-announce: derived from `last_announce_time`
    /// when known, otherwise extrapolated from the last cached remote
    /// value (Open Question (a): either source is treated as authoritative
    /// when the other is unavailable).
    #[must_use]
    pub fn get_tl(&self, now: f64) -> f64 {
        if let Some(last_announce) = self.last_announce_time {
            (last_announce + self.announce_interval(now)) - now
        } else if let Some(cached) = self.cached_tl {
            (cached - (now - self.cache_ts)).max(0.0)
        } else {
            self.announce_interval(now)
        }
    }

    /// Records a freshly fetched remote time-left value.
    pub fn update_remote_tl(&mut self, value: f64, now: f64) {
        self.cached_tl = Some(value);
        self.cache_ts = now;
    }

    /// Whether the cached remote time-left value should be refreshed,
    /// given the torrent's last-known phase.
    #[must_use]
    pub fn should_refresh_remote_tl(&self, now: f64, last_phase: Phase) -> bool {
        if self.last_announce_time.is_some() {
            return false;
        }
        now - self.cache_ts >= Self::remote_ttl(last_phase)
    }

    /// Phase classification at `now`.
    #[must_use]
    pub fn phase(&self, now: f64) -> Phase {
        Phase::classify(self.get_tl(now), self.cycle_synced)
    }

    /// Seconds elapsed in the current cycle.
    #[must_use]
    pub fn elapsed(&self, now: f64) -> f64 {
        (now - self.cycle_start).max(0.0)
    }

    /// Bytes uploaded since the current cycle started.
    #[must_use]
    pub fn uploaded_in_cycle(&self, current_uploaded: u64) -> f64 {
        current_uploaded.saturating_sub(self.cycle_start_uploaded) as f64
    }

    /// Real average upload speed over the whole observed session.
    #[must_use]
    pub fn real_avg_speed(&self, current_uploaded: u64, now: f64) -> f64 {
        let uploaded = (current_uploaded.saturating_sub(self.total_uploaded_start)) as f64;
        safe_div(uploaded, now - self.session_start_time, 0.0)
    }

    fn start_cycle(&mut self, now: f64, total_uploaded: u64, tl_for_backdate: Option<f64>, is_jump: bool) {
        self.cycle_start_uploaded = total_uploaded;
        if !is_jump {
            let announce_interval = self.announce_interval(now);
            if (now - self.added_at) < announce_interval {
                self.cycle_start_uploaded = 0;
            } else if let Some(tl) = tl_for_backdate {
                let elapsed_in_cycle = announce_interval - tl;
                if elapsed_in_cycle > 60.0 && self.kalman.speed() > 0.0 {
                    self.cycle_start_uploaded =
                        ((total_uploaded as f64) - self.kalman.speed() * elapsed_in_cycle).max(0.0) as u64;
                }
            }
        }
        self.cycle_start = now;
        self.last_announce_time = Some(now);
        self.report_sent = false;
        self.dl_limited_this_cycle = false;
        self.reannounced_this_cycle = false;
        self.waiting_reannounce = false;
        self.kalman.reset();
        self.speed_tracker.clear();
        self.rate_controller.reset();
    }

    fn handle_jump(&mut self, now: f64, total_uploaded: u64, target_bytes_per_sec: f64) -> CycleReport {
        let elapsed = self.elapsed(now);
        let uploaded_in_cycle = self.uploaded_in_cycle(total_uploaded);
        let ratio = safe_div(uploaded_in_cycle, target_bytes_per_sec * elapsed, 1.0);
        let report = CycleReport {
            cycle_index: self.cycle_index,
            elapsed,
            uploaded_in_cycle,
            ratio,
            phase: self.phase(now),
        };

        self.jump_count += 1;
        if self.jump_count >= 2 && self.last_jump > 0.0 {
            self.cycle_interval = now - self.last_jump;
            self.cycle_synced = true;
        }
        self.last_jump = now;
        self.cycle_index += 1;
        self.start_cycle(now, total_uploaded, None, true);
        report
    }

    /// Advances the state machine by one tick: updates the cached time-left,
    /// detects cycle rollover, and returns the completed cycle's report
    /// when a rollover just happened.
    ///
    /// `target_bytes_per_sec` is the effective (margin- and
    /// precision-adjusted) target, used only to compute the outgoing
    /// report's ratio.
    pub fn observe_tick(
        &mut self,
        now: f64,
        total_uploaded: u64,
        remote_tl: Option<f64>,
        target_bytes_per_sec: f64,
    ) -> Option<CycleReport> {
        if self.is_uninitialised() {
            self.total_uploaded_start = total_uploaded;
            self.session_start_time = now;
            let tl = remote_tl.unwrap_or_else(|| self.announce_interval(now));
            self.update_remote_tl(tl, now);
            self.start_cycle(now, total_uploaded, Some(tl), false);
            self.prev_tl = Some(tl);
            return None;
        }

        // Jump detection must use the freshest *observed* reading (the
        // remote client's own countdown) rather than our locally derived
        // `last_announce_time + interval` estimate: the latter decreases
        // smoothly by construction and would never itself jump upward.
        let observed_tl = remote_tl.unwrap_or_else(|| self.get_tl(now));
        if let Some(remote) = remote_tl {
            self.update_remote_tl(remote, now);
        }

        let mut report = None;
        if let Some(prev) = self.prev_tl {
            if observed_tl - prev > CYCLE_JUMP_THRESHOLD {
                report = Some(self.handle_jump(now, total_uploaded, target_bytes_per_sec));
            }
        }
        self.prev_tl = Some(if report.is_some() {
            remote_tl.unwrap_or_else(|| self.get_tl(now))
        } else {
            observed_tl
        });
        report
    }
}

/// Process-wide aggregate counters, persisted as a singleton row.
///
/// Grounded on the original program's `model.py::Stats`.
#[derive(Debug, Clone, Copy)]
pub struct Stats {
    /// Wall time the daemon started accumulating these stats.
    pub start_time: f64,
    /// Total completed cycles observed across all torrents.
    pub total_cycles: u64,
    /// Cycles whose ratio was `>= STATS_SUCCESS_RATIO`.
    pub success_cycles: u64,
    /// Cycles whose ratio was within `STATS_PRECISION_TOLERANCE` of 1.0.
    pub precision_cycles: u64,
    /// Total bytes uploaded across all recorded cycles.
    pub uploaded_bytes: u64,
}

impl Stats {
    /// Builds a fresh, zeroed stats accumulator.
    #[must_use]
    pub fn new(start_time: f64) -> Self {
        Self { start_time, total_cycles: 0, success_cycles: 0, precision_cycles: 0, uploaded_bytes: 0 }
    }

    /// Folds a completed cycle's ratio and uploaded-byte count into the
    /// aggregate counters.
    pub fn record(&mut self, ratio: f64, uploaded: u64) {
        self.total_cycles += 1;
        if ratio >= STATS_SUCCESS_RATIO {
            self.success_cycles += 1;
        }
        if (ratio - 1.0).abs() <= STATS_PRECISION_TOLERANCE {
            self.precision_cycles += 1;
        }
        self.uploaded_bytes += uploaded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Realistic wall-clock base; `now == 0.0` collides with the
    // `cycle_start` uninitialised sentinel and never occurs for real
    // epoch timestamps.
    const T0: f64 = 1_700_000_000.0;

    #[test]
    fn first_observation_starts_cycle_and_emits_no_report() {
        let mut state = TorrentState::new("abc", "Name", 1_000_000, T0);
        let report = state.observe_tick(T0, 0, Some(1800.0), 1000.0);
        assert!(report.is_none());
        assert!(!state.is_uninitialised());
        assert_eq!(state.cycle_index, 0);
    }

    #[test]
    fn new_torrent_starts_cycle_with_zero_baseline() {
        let mut state = TorrentState::new("abc", "Name", 1_000_000, T0);
        state.observe_tick(T0, 500, Some(1800.0), 1000.0);
        assert_eq!(state.cycle_start_uploaded, 0);
    }

    #[test]
    fn jump_increments_cycle_index_and_emits_report() {
        let mut state = TorrentState::new("abc", "Name", 1_000_000, T0);
        state.observe_tick(T0, 0, Some(60.0), 1000.0);
        // Next tick: tl jumps from ~1 back up past threshold -> rollover.
        state.observe_tick(T0 + 1.0, 2000, Some(1.0), 1000.0);
        let report = state.observe_tick(T0 + 2.0, 2100, Some(1750.0), 1000.0);
        assert!(report.is_some());
        let report = report.unwrap();
        assert_eq!(report.cycle_index, 0);
        assert_eq!(state.cycle_index, 1);
    }

    #[test]
    fn second_jump_marks_synced_and_fills_interval() {
        let mut state = TorrentState::new("abc", "Name", 1_000_000, T0);
        state.observe_tick(T0, 0, Some(60.0), 1000.0);
        state.observe_tick(T0 + 1800.0, 1000, Some(1750.0), 1000.0); // jump #1
        assert!(!state.cycle_synced);
        state.observe_tick(T0 + 1801.0, 1010, Some(60.0), 1000.0);
        state.observe_tick(T0 + 3600.0, 2000, Some(1750.0), 1000.0); // jump #2
        assert!(state.cycle_synced);
        assert!(state.cycle_interval > 0.0);
    }

    #[test]
    fn cycle_index_never_decreases() {
        let mut state = TorrentState::new("abc", "Name", 1_000_000, T0);
        state.observe_tick(T0, 0, Some(60.0), 1000.0);
        let mut last = state.cycle_index;
        for i in 1..10 {
            state.observe_tick(T0 + i as f64 * 1800.0, i as u64 * 1_000_000, Some(1750.0), 1000.0);
            assert!(state.cycle_index >= last);
            last = state.cycle_index;
        }
    }

    #[test]
    fn stats_record_buckets_correctly() {
        let mut stats = Stats::new(0.0);
        stats.record(1.0, 1000);
        stats.record(0.8, 500);
        stats.record(1.2, 200);
        assert_eq!(stats.total_cycles, 3);
        assert_eq!(stats.precision_cycles, 1);
        assert_eq!(stats.success_cycles, 2);
        assert_eq!(stats.uploaded_bytes, 1700);
    }
}
