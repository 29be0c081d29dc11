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

//! Persistence for per-torrent cycle state, aggregate stats, and runtime
//! config overrides.
//!
//! Grounded on the teacher's `RuntimeStore` (pool-wrapping struct,
//! `migrate!`, `FromRow` derives) but targets `sqlx::SqlitePool` instead of
//! `PgPool`/stored procedures, and the schema is lifted directly from the
//! original daemon's own SQLite tables (`torrent_states`, `stats`,
//! `runtime_config`).

use anyhow::{Context, Result};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{FromRow, Row, SqlitePool};

/// Persisted per-torrent cycle bookkeeping, mirroring `torrent_states`.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct TorrentStateRow {
    /// Torrent hash, the row's identity.
    pub hash: String,
    /// Display name at last save.
    pub name: String,
    /// Upstream tracker/site torrent id, if known.
    pub tid: Option<i64>,
    /// Promotion/free-leech label, if any.
    pub promotion: Option<String>,
    /// Wall time the torrent was published, Unix epoch seconds.
    pub publish_time: f64,
    /// Index of the current upload cycle.
    pub cycle_index: i64,
    /// Wall time the current cycle started.
    pub cycle_start: f64,
    /// Cumulative uploaded bytes at cycle start.
    pub cycle_start_uploaded: i64,
    /// Whether the cycle boundary is synced to the tracker-reported
    /// announce interval (`1`) or still provisional (`0`).
    pub cycle_synced: i64,
    /// Cycle duration, seconds.
    pub cycle_interval: f64,
    /// Cumulative uploaded bytes when this torrent was first observed.
    pub total_uploaded_start: i64,
    /// Wall time this torrent's tracking session started.
    pub session_start_time: f64,
    /// Wall time of the last recorded tracker announce.
    pub last_announce_time: f64,
    /// Wall time this row was last written.
    pub updated_at: f64,
}

/// Persisted aggregate daemon statistics, mirroring `stats`.
#[derive(Debug, Clone, Copy, PartialEq, FromRow)]
pub struct StatsRow {
    /// Total upload cycles observed across all torrents.
    pub total_cycles: i64,
    /// Cycles that finished within tolerance of their target ratio.
    pub success_cycles: i64,
    /// Cycles in which the precision tracker nudged the global adjustment.
    pub precision_cycles: i64,
    /// Cumulative bytes uploaded across all managed torrents.
    pub total_uploaded: i64,
    /// Wall time the daemon started tracking statistics.
    pub start_time: f64,
    /// Wall time this row was last written.
    pub updated_at: f64,
}

/// `SQLite`-backed repository for runtime torrent state and aggregate stats.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if necessary) the database at `database_url` and
    /// applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or
    /// migrations fail to run.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await
            .context("failed to open sqlite database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run store migrations")?;

        Ok(Self { pool })
    }

    /// Accesses the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Upserts one torrent's cycle bookkeeping.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn save_torrent_state(&self, row: &TorrentStateRow) -> Result<()> {
        sqlx::query(
            r"INSERT INTO torrent_states
                (hash, name, tid, promotion, publish_time, cycle_index, cycle_start,
                 cycle_start_uploaded, cycle_synced, cycle_interval, total_uploaded_start,
                 session_start_time, last_announce_time, updated_at)
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
              ON CONFLICT(hash) DO UPDATE SET
                name = excluded.name,
                tid = excluded.tid,
                promotion = excluded.promotion,
                publish_time = excluded.publish_time,
                cycle_index = excluded.cycle_index,
                cycle_start = excluded.cycle_start,
                cycle_start_uploaded = excluded.cycle_start_uploaded,
                cycle_synced = excluded.cycle_synced,
                cycle_interval = excluded.cycle_interval,
                total_uploaded_start = excluded.total_uploaded_start,
                session_start_time = excluded.session_start_time,
                last_announce_time = excluded.last_announce_time,
                updated_at = excluded.updated_at",
        )
        .bind(&row.hash)
        .bind(&row.name)
        .bind(row.tid)
        .bind(&row.promotion)
        .bind(row.publish_time)
        .bind(row.cycle_index)
        .bind(row.cycle_start)
        .bind(row.cycle_start_uploaded)
        .bind(row.cycle_synced)
        .bind(row.cycle_interval)
        .bind(row.total_uploaded_start)
        .bind(row.session_start_time)
        .bind(row.last_announce_time)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await
        .context("failed to upsert torrent state")?;

        Ok(())
    }

    /// Loads one torrent's cycle bookkeeping, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn load_torrent_state(&self, hash: &str) -> Result<Option<TorrentStateRow>> {
        let row = sqlx::query_as::<_, TorrentStateRow>("SELECT * FROM torrent_states WHERE hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load torrent state")?;
        Ok(row)
    }

    /// Lists every torrent hash with a persisted state row.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn all_torrent_hashes(&self) -> Result<Vec<String>> {
        let rows: Vec<SqliteRow> = sqlx::query("SELECT hash FROM torrent_states")
            .fetch_all(&self.pool)
            .await
            .context("failed to list torrent hashes")?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("hash").context("malformed hash column"))
            .collect()
    }

    /// Upserts the singleton aggregate stats row.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn save_stats(&self, row: &StatsRow) -> Result<()> {
        sqlx::query(
            r"INSERT INTO stats (id, total_cycles, success_cycles, precision_cycles, total_uploaded, start_time, updated_at)
              VALUES (1, ?, ?, ?, ?, ?, ?)
              ON CONFLICT(id) DO UPDATE SET
                total_cycles = excluded.total_cycles,
                success_cycles = excluded.success_cycles,
                precision_cycles = excluded.precision_cycles,
                total_uploaded = excluded.total_uploaded,
                start_time = excluded.start_time,
                updated_at = excluded.updated_at",
        )
        .bind(row.total_cycles)
        .bind(row.success_cycles)
        .bind(row.precision_cycles)
        .bind(row.total_uploaded)
        .bind(row.start_time)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await
        .context("failed to upsert aggregate stats")?;

        Ok(())
    }

    /// Loads the singleton aggregate stats row, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn load_stats(&self) -> Result<Option<StatsRow>> {
        let row = sqlx::query_as::<_, StatsRow>(
            "SELECT total_cycles, success_cycles, precision_cycles, total_uploaded, start_time, updated_at FROM stats WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("failed to load aggregate stats")?;
        Ok(row)
    }

    /// Stores a runtime configuration override keyed by `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn save_runtime_config(&self, key: &str, value: &str, updated_at: f64) -> Result<()> {
        sqlx::query(
            "INSERT INTO runtime_config (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .context("failed to save runtime config override")?;

        Ok(())
    }

    /// Fetches a runtime configuration override, if one has been set.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn runtime_config(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM runtime_config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("failed to fetch runtime config override")?;
        row.map(|row| row.try_get::<String, _>("value").context("malformed value column"))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state(hash: &str) -> TorrentStateRow {
        TorrentStateRow {
            hash: hash.to_string(),
            name: "demo".to_string(),
            tid: Some(42),
            promotion: None,
            publish_time: 1_000.0,
            cycle_index: 0,
            cycle_start: 1_000.0,
            cycle_start_uploaded: 0,
            cycle_synced: 0,
            cycle_interval: 1_800.0,
            total_uploaded_start: 0,
            session_start_time: 1_000.0,
            last_announce_time: 1_000.0,
            updated_at: 1_000.0,
        }
    }

    #[tokio::test]
    async fn round_trips_torrent_state_and_stats() {
        let store = Store::new("sqlite::memory:").await.unwrap();

        let state = sample_state("abc123");
        store.save_torrent_state(&state).await.unwrap();
        let loaded = store.load_torrent_state("abc123").await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(store.all_torrent_hashes().await.unwrap(), vec!["abc123".to_string()]);

        let mut updated = state.clone();
        updated.cycle_index = 1;
        store.save_torrent_state(&updated).await.unwrap();
        let reloaded = store.load_torrent_state("abc123").await.unwrap().unwrap();
        assert_eq!(reloaded.cycle_index, 1);

        assert!(store.load_stats().await.unwrap().is_none());
        let stats = StatsRow {
            total_cycles: 10,
            success_cycles: 8,
            precision_cycles: 2,
            total_uploaded: 1_000_000,
            start_time: 1_000.0,
            updated_at: 2_000.0,
        };
        store.save_stats(&stats).await.unwrap();
        assert_eq!(store.load_stats().await.unwrap(), Some(stats));

        assert!(store.runtime_config("override_host").await.unwrap().is_none());
        store.save_runtime_config("override_host", "10.0.0.1", 2_000.0).await.unwrap();
        assert_eq!(
            store.runtime_config("override_host").await.unwrap(),
            Some("10.0.0.1".to_string())
        );
    }
}
