//! Engine configuration model.
//!
//! Field set mirrors the original Python daemon's `Config` dataclass
//! field-for-field; defaults match its dataclass defaults.

use serde::Deserialize;

use crate::defaults::{
    DEFAULT_API_RATE_LIMIT, DEFAULT_AUTOREMOVE_INTERVAL_SEC, DEFAULT_FLEXGET_INTERVAL_SEC,
    DEFAULT_LOG_LEVEL, DEFAULT_SAFETY_MARGIN,
};

/// Upload rate-control daemon configuration, loaded from a JSON file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// qBittorrent Web API host, e.g. `http://127.0.0.1:8080`.
    #[serde(default)]
    pub host: String,
    /// Web API username.
    #[serde(default)]
    pub username: String,
    /// Web API password.
    #[serde(default)]
    pub password: String,
    /// Target aggregate upload speed, KiB/s.
    #[serde(default)]
    pub target_speed_kib: u64,
    /// Fraction of `target_speed_kib` actually targeted, to leave headroom.
    #[serde(default = "default_safety_margin")]
    pub safety_margin: f64,
    /// `tracing` log level filter, e.g. `"info"`, `"debug"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Only torrents whose tracker URL contains this substring are managed
    /// (empty string disables the filter).
    #[serde(default)]
    pub target_tracker_keyword: String,
    /// Torrents whose tracker URL contains this substring are ignored.
    #[serde(default)]
    pub exclude_tracker_keyword: String,
    /// Telegram bot token for alert notifications (empty disables).
    #[serde(default)]
    pub telegram_bot_token: String,
    /// Telegram chat id to notify.
    #[serde(default)]
    pub telegram_chat_id: String,
    /// Hard physical upload ceiling, KiB/s (`0` = no ceiling).
    #[serde(default)]
    pub max_physical_speed_kib: u64,
    /// Maximum qBittorrent API requests issued per second.
    #[serde(default = "default_api_rate_limit")]
    pub api_rate_limit: u32,
    /// Cookie header value used for U2-style private tracker peer list scraping.
    #[serde(default)]
    pub u2_cookie: String,
    /// Outbound proxy URL for tracker/peer-list requests (empty disables).
    #[serde(default)]
    pub proxy: String,
    /// Enables the peer-list based precision telemetry path.
    #[serde(default = "default_true")]
    pub peer_list_enabled: bool,
    /// Enables the download limiter module.
    #[serde(default = "default_true")]
    pub enable_dl_limit: bool,
    /// Enables the reannounce optimiser module.
    #[serde(default = "default_true")]
    pub enable_reannounce_opt: bool,
    /// Enables the Flexget integration poller.
    #[serde(default)]
    pub flexget_enabled: bool,
    /// Flexget poll interval, seconds.
    #[serde(default = "default_flexget_interval_sec")]
    pub flexget_interval_sec: u64,
    /// Enables the stalled/orphaned torrent autoremove sweep.
    #[serde(default)]
    pub autoremove_enabled: bool,
    /// Autoremove sweep interval, seconds.
    #[serde(default = "default_autoremove_interval_sec")]
    pub autoremove_interval_sec: u64,
}

fn default_safety_margin() -> f64 {
    DEFAULT_SAFETY_MARGIN
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_api_rate_limit() -> u32 {
    DEFAULT_API_RATE_LIMIT
}

fn default_flexget_interval_sec() -> u64 {
    DEFAULT_FLEXGET_INTERVAL_SEC
}

fn default_autoremove_interval_sec() -> u64 {
    DEFAULT_AUTOREMOVE_INTERVAL_SEC
}

const fn default_true() -> bool {
    true
}

impl EngineConfig {
    /// Target aggregate upload speed, bytes/s, after `safety_margin` is
    /// applied; always at least 1.
    #[must_use]
    pub fn target_bytes_per_sec(&self) -> i64 {
        let raw = (self.target_speed_kib as f64) * 1024.0 * self.safety_margin;
        raw.max(1.0) as i64
    }

    /// Hard physical upload ceiling, bytes/s (`0` means disabled).
    #[must_use]
    pub fn max_physical_bytes_per_sec(&self) -> i64 {
        (self.max_physical_speed_kib as i64).saturating_mul(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> EngineConfig {
        EngineConfig {
            host: "http://127.0.0.1:8080".to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
            target_speed_kib: 10_000,
            safety_margin: 0.98,
            log_level: "info".to_string(),
            target_tracker_keyword: String::new(),
            exclude_tracker_keyword: String::new(),
            telegram_bot_token: String::new(),
            telegram_chat_id: String::new(),
            max_physical_speed_kib: 0,
            api_rate_limit: 20,
            u2_cookie: String::new(),
            proxy: String::new(),
            peer_list_enabled: true,
            enable_dl_limit: true,
            enable_reannounce_opt: true,
            flexget_enabled: false,
            flexget_interval_sec: 120,
            autoremove_enabled: false,
            autoremove_interval_sec: 1800,
        }
    }

    #[test]
    fn target_bytes_applies_safety_margin() {
        let cfg = base();
        assert_eq!(cfg.target_bytes_per_sec(), (10_000.0 * 1024.0 * 0.98) as i64);
    }

    #[test]
    fn zero_physical_ceiling_stays_zero() {
        let cfg = base();
        assert_eq!(cfg.max_physical_bytes_per_sec(), 0);
    }

    #[test]
    fn deserialises_with_defaults_for_missing_fields() {
        let cfg: EngineConfig = serde_json::from_str(
            r#"{"host":"http://127.0.0.1:8080","username":"a","password":"b","target_speed_kib":5000}"#,
        )
        .unwrap();
        assert!((cfg.safety_margin - 0.98).abs() < f64::EPSILON);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.api_rate_limit, 20);
        assert!(cfg.enable_dl_limit);
        assert_eq!(cfg.flexget_interval_sec, 120);
    }
}
