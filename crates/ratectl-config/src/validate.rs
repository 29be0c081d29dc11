//! Validation helpers for [`crate::model::EngineConfig`].

use crate::error::ConfigError;
use crate::model::EngineConfig;

/// Rejects a config whose fields cannot produce a sensible rate-control run.
pub(crate) fn validate(cfg: &EngineConfig) -> Result<(), ConfigError> {
    if cfg.host.trim().is_empty() {
        return Err(ConfigError::InvalidField {
            field: "host",
            value: cfg.host.clone(),
            reason: "must not be empty",
        });
    }
    if cfg.target_speed_kib == 0 {
        return Err(ConfigError::InvalidField {
            field: "target_speed_kib",
            value: cfg.target_speed_kib.to_string(),
            reason: "must be positive",
        });
    }
    if !(0.0..=1.0).contains(&cfg.safety_margin) {
        return Err(ConfigError::InvalidField {
            field: "safety_margin",
            value: cfg.safety_margin.to_string(),
            reason: "must be between 0 and 1",
        });
    }
    if cfg.api_rate_limit == 0 {
        return Err(ConfigError::InvalidField {
            field: "api_rate_limit",
            value: cfg.api_rate_limit.to_string(),
            reason: "must be positive",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> EngineConfig {
        EngineConfig {
            host: "http://127.0.0.1:8080".to_string(),
            username: String::new(),
            password: String::new(),
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
    fn accepts_sane_config() {
        assert!(validate(&base()).is_ok());
    }

    #[test]
    fn rejects_empty_host() {
        let mut cfg = base();
        cfg.host = String::new();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rejects_zero_target_speed() {
        let mut cfg = base();
        cfg.target_speed_kib = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rejects_out_of_range_safety_margin() {
        let mut cfg = base();
        cfg.safety_margin = 1.5;
        assert!(validate(&cfg).is_err());
    }
}
