//! qBittorrent Web API adapter, built on top of the `qbit-rs` client.
//!
//! Grounded on `dragmine149-qbittorrent-webui-api`'s endpoint coverage
//! (`torrents/info`, `torrents/properties`, `torrents/uploadLimit`,
//! `torrents/downloadLimit`, `torrents/reannounce`) and `qbit-rs`'s typed
//! request/response shapes (`Qbit`, `model::torrent::Torrent`/
//! `TorrentProperty`).

use async_trait::async_trait;
use qbit_rs::model::{Credential, GetTorrentListArg};
use qbit_rs::Qbit;

use crate::error::{ClientError, ClientResult};
use crate::{TorrentClient, TorrentPropertiesSnapshot, TorrentSnapshot};

/// qBittorrent-backed [`TorrentClient`].
pub struct QbittorrentClient {
    qbit: Qbit,
}

/// `qBittorrent`'s "no ETA"/"infinite" sentinel (8640000 s, 100 days).
const INFINITE_ETA: i64 = 8_640_000;

impl QbittorrentClient {
    /// Builds an adapter against `endpoint` (e.g. `http://localhost:8080`),
    /// authenticating with `username`/`password` on first request.
    #[must_use]
    pub fn new(endpoint: impl AsRef<str>, username: &str, password: &str) -> Self {
        let qbit = Qbit::new(endpoint.as_ref(), Credential::new(username, password));
        Self { qbit }
    }
}

fn finite_eta(eta: Option<i64>) -> Option<u64> {
    match eta {
        Some(value) if value >= 0 && value < INFINITE_ETA => Some(value as u64),
        _ => None,
    }
}

#[async_trait]
impl TorrentClient for QbittorrentClient {
    async fn list_torrents(&self) -> ClientResult<Vec<TorrentSnapshot>> {
        let torrents = self.qbit.get_torrent_list(GetTorrentListArg::default()).await?;
        Ok(torrents
            .into_iter()
            .filter_map(|t| {
                let hash = t.hash?;
                Some(TorrentSnapshot {
                    hash,
                    name: t.name.unwrap_or_default(),
                    total_size: t.total_size.unwrap_or(0).max(0) as u64,
                    uploaded: t.uploaded.unwrap_or(0).max(0) as u64,
                    downloaded: t.downloaded.unwrap_or(0).max(0) as u64,
                    up_speed: t.upspeed.unwrap_or(0).max(0) as u64,
                    dl_speed: t.dlspeed.unwrap_or(0).max(0) as u64,
                    up_limit: t.up_limit.unwrap_or(-1),
                    dl_limit: t.dl_limit.unwrap_or(-1),
                    eta: finite_eta(t.eta),
                    amount_left: t.amount_left.unwrap_or(0).max(0) as u64,
                    added_on: t.added_on.unwrap_or(0) as f64,
                    tracker: t.tracker.unwrap_or_default(),
                    state: t.state.map(|s| format!("{s:?}")).unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn properties(&self, hash: &str) -> ClientResult<TorrentPropertiesSnapshot> {
        let props = self
            .qbit
            .get_torrent_properties(hash)
            .await
            .map_err(|err| match err {
                qbit_rs::Error::ApiError(qbit_rs::ApiError::TorrentNotFound) => {
                    ClientError::NotFound { hash: hash.to_owned() }
                }
                other => ClientError::Transport(other),
            })?;
        Ok(TorrentPropertiesSnapshot {
            reannounce: props.reannounce.unwrap_or(0).max(0) as u64,
            total_uploaded: props.total_uploaded.unwrap_or(0).max(0) as u64,
            total_downloaded: props.total_downloaded.unwrap_or(0).max(0) as u64,
            up_limit: props.up_limit.unwrap_or(-1),
            dl_limit: props.dl_limit.unwrap_or(-1),
            time_elapsed: props.time_elapsed.unwrap_or(0).max(0) as u64,
        })
    }

    async fn set_upload_limit(&self, hash: &str, bytes_per_sec: i64) -> ClientResult<()> {
        let limit = if bytes_per_sec < 0 { 0 } else { bytes_per_sec as u64 };
        self.qbit.set_torrent_upload_limit(vec![hash.to_owned()], limit).await?;
        Ok(())
    }

    async fn set_download_limit(&self, hash: &str, bytes_per_sec: i64) -> ClientResult<()> {
        let limit = if bytes_per_sec < 0 { 0 } else { bytes_per_sec as u64 };
        self.qbit.set_torrent_download_limit(vec![hash.to_owned()], limit).await?;
        Ok(())
    }

    async fn reannounce(&self, hash: &str) -> ClientResult<()> {
        self.qbit.reannounce_torrents(vec![hash.to_owned()]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinite_eta_sentinel_becomes_none() {
        assert_eq!(finite_eta(Some(INFINITE_ETA)), None);
        assert_eq!(finite_eta(Some(-1)), None);
        assert_eq!(finite_eta(Some(42)), Some(42));
    }
}
