//! Errors surfaced by torrent-engine adapters.

use thiserror::Error;

/// Errors returned by a [`crate::TorrentClient`] implementation.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The underlying transport or API call failed.
    #[error("engine request failed: {0}")]
    Transport(#[from] qbit_rs::Error),
    /// The referenced torrent is not known to the engine.
    #[error("torrent {hash} not found")]
    NotFound {
        /// Torrent hash that was not found.
        hash: String,
    },
    /// The adapter does not implement this operation.
    #[error("operation not supported by this engine: {0}")]
    Unsupported(&'static str),
}

/// Convenience alias for [`ClientError`]-returning results.
pub type ClientResult<T> = Result<T, ClientError>;
