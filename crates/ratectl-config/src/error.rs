//! Configuration load/validation errors.

use thiserror::Error;

/// Errors raised while loading or validating [`crate::model::EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read from disk.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that was being read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file was not valid JSON.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path that was being parsed.
        path: String,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// A field failed validation after parsing.
    #[error("invalid config field {field}: {reason} (value: {value})")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// String representation of the rejected value.
        value: String,
        /// Human-readable reason for the rejection.
        reason: &'static str,
    },
}

/// Convenience alias for [`ConfigError`]-returning results.
pub type ConfigResult<T> = Result<T, ConfigError>;
