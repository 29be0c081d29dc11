#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Engine-agnostic torrent client interface and DTOs, plus a qBittorrent
//! Web API adapter.
//!
//! Mirrors the teacher's `TorrentEngine` trait shape: one required
//! operation (listing and applying an upload limit are the whole point of
//! this daemon) and a set of optional operations with default
//! `Unsupported` implementations for adapters that can't do them.

pub mod error;
pub mod qbittorrent;

use async_trait::async_trait;

pub use error::{ClientError, ClientResult};
pub use qbittorrent::QbittorrentClient;

/// Point-in-time snapshot of one torrent, as reported by the engine's
/// torrent list endpoint.
#[derive(Debug, Clone, Default)]
pub struct TorrentSnapshot {
    /// Torrent info hash (hex).
    pub hash: String,
    /// Display name.
    pub name: String,
    /// Total torrent size, bytes.
    pub total_size: u64,
    /// Cumulative bytes uploaded.
    pub uploaded: u64,
    /// Cumulative bytes downloaded.
    pub downloaded: u64,
    /// Current upload speed, bytes/s.
    pub up_speed: u64,
    /// Current download speed, bytes/s.
    pub dl_speed: u64,
    /// Currently applied upload limit, bytes/s (`-1` = unlimited).
    pub up_limit: i64,
    /// Currently applied download limit, bytes/s (`-1` = unlimited).
    pub dl_limit: i64,
    /// Engine-reported download ETA, seconds (`None` if unknown/infinite).
    pub eta: Option<u64>,
    /// Bytes left to download.
    pub amount_left: u64,
    /// Wall time the torrent was added to the client, Unix epoch seconds.
    pub added_on: f64,
    /// First tracker with a working status, if any.
    pub tracker: String,
    /// Raw engine state string (e.g. `"uploading"`, `"pausedUP"`).
    pub state: String,
}

/// Deeper per-torrent properties, fetched only for torrents this daemon is
/// actively managing (the list endpoint alone is too coarse for cycle
/// bookkeeping).
#[derive(Debug, Clone, Copy, Default)]
pub struct TorrentPropertiesSnapshot {
    /// Seconds until the tracker is next re-announced.
    pub reannounce: u64,
    /// Cumulative bytes uploaded across the torrent's lifetime.
    pub total_uploaded: u64,
    /// Cumulative bytes downloaded across the torrent's lifetime.
    pub total_downloaded: u64,
    /// Currently applied upload limit, bytes/s (`-1` = unlimited).
    pub up_limit: i64,
    /// Currently applied download limit, bytes/s (`-1` = unlimited).
    pub dl_limit: i64,
    /// Seconds the torrent has been active.
    pub time_elapsed: u64,
}

/// Engine-agnostic façade the rest of the daemon drives.
#[async_trait]
pub trait TorrentClient: Send + Sync {
    /// Lists every torrent currently known to the engine.
    async fn list_torrents(&self) -> ClientResult<Vec<TorrentSnapshot>>;

    /// Fetches extended properties for one torrent.
    async fn properties(&self, hash: &str) -> ClientResult<TorrentPropertiesSnapshot>;

    /// Applies a new upload limit, bytes/s (`-1` = unlimited). The one
    /// operation every adapter must support.
    async fn set_upload_limit(&self, hash: &str, bytes_per_sec: i64) -> ClientResult<()>;

    /// Applies a new download limit, bytes/s (`-1` = unlimited); default
    /// implementation reports lack of support.
    async fn set_download_limit(&self, hash: &str, bytes_per_sec: i64) -> ClientResult<()> {
        let _ = (hash, bytes_per_sec);
        Err(ClientError::Unsupported("download limit"))
    }

    /// Forces a tracker re-announce; default implementation reports lack
    /// of support.
    async fn reannounce(&self, hash: &str) -> ClientResult<()> {
        let _ = hash;
        Err(ClientError::Unsupported("reannounce"))
    }
}
