//! Default values for optional configuration fields.
//!
//! Mirrors the original daemon's dataclass field defaults.

/// Fraction of the configured target speed actually targeted.
pub(crate) const DEFAULT_SAFETY_MARGIN: f64 = 0.98;
/// Default `tracing` log level filter.
pub(crate) const DEFAULT_LOG_LEVEL: &str = "info";
/// Default ceiling on qBittorrent API requests per second.
pub(crate) const DEFAULT_API_RATE_LIMIT: u32 = 20;
/// Default Flexget poll interval, seconds.
pub(crate) const DEFAULT_FLEXGET_INTERVAL_SEC: u64 = 120;
/// Default autoremove sweep interval, seconds.
pub(crate) const DEFAULT_AUTOREMOVE_INTERVAL_SEC: u64 = 1800;
