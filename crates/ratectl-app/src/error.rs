//! Top-level error type for bootstrap and coordinator failures.
//!
//! Grounded on the teacher's `revaer-app` boundary: lower crates keep their
//! own `thiserror` enums, and this crate wraps them with `anyhow` context
//! only where a failure genuinely has no more specific home.

use thiserror::Error;

/// Errors that can abort daemon bootstrap or the coordinator loop.
#[derive(Debug, Error)]
pub enum AppError {
    /// The configuration file could not be loaded or failed validation.
    #[error("failed to load configuration: {0}")]
    Config(#[from] ratectl_config::ConfigError),
    /// The persistence layer could not be opened or migrated.
    #[error("failed to initialise persistence: {0}")]
    Store(#[source] anyhow::Error),
    /// The metrics registry could not be constructed.
    #[error("failed to initialise metrics: {0}")]
    Metrics(#[source] anyhow::Error),
    /// The logging subscriber could not be installed.
    #[error("failed to initialise logging: {0}")]
    Logging(#[source] anyhow::Error),
    /// The torrent client stayed unreachable through the full reconnect
    /// back-off schedule.
    #[error("torrent client unreachable after {attempts} attempts: {source}")]
    ClientUnavailable {
        /// Number of reconnect attempts made before giving up.
        attempts: usize,
        /// Underlying client error from the final attempt.
        #[source]
        source: ratectl_client::ClientError,
    },
}

/// Convenience alias for [`AppError`]-returning results.
pub type AppResult<T> = Result<T, AppError>;
