//! Dependency wiring for the rate-control daemon.
//!
//! Grounded on the teacher's `BootstrapDependencies::from_env`/`run_app`
//! split: construction is separated from the run loop so tests (and the
//! `once` CLI path) can assemble dependencies without going through a
//! long-lived process. The config-watch task mirrors the teacher's
//! poll-and-publish pattern instead of blocking the coordinator's own tick
//! loop on `ConfigWatcher::next`'s internal sleep.

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use ratectl_client::{QbittorrentClient, TorrentClient};
use ratectl_config::{watch, ConfigWatcher, EngineConfig};
use ratectl_core::PrecisionTracker;
use ratectl_events::{Event, EventBus};
use ratectl_store::Store;
use ratectl_telemetry::{build_sha, init_logging, LogFormat, LoggingConfig, Metrics};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::coordinator::Coordinator;
use crate::error::{AppError, AppResult};

const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_DATABASE_URL: &str = "sqlite://ratectl.db";

/// Fully wired dependency set the coordinator drives.
pub struct BootstrapDependencies {
    /// Shared, hot-reloadable configuration snapshot.
    pub config: Arc<RwLock<Arc<EngineConfig>>>,
    /// Persistence layer.
    pub store: Store,
    /// Process-wide event bus.
    pub events: EventBus,
    /// Prometheus metrics registry.
    pub metrics: Metrics,
    /// Process-wide precision tracker shared across every managed torrent.
    pub precision: PrecisionTracker,
    /// Torrent client adapter.
    pub client: Arc<dyn TorrentClient>,
    watcher: Option<ConfigWatcher>,
}

impl BootstrapDependencies {
    /// Loads configuration, installs logging, opens persistence and
    /// constructs every dependency the coordinator needs, applying any
    /// persisted runtime overrides for connection details.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be loaded, logging cannot be
    /// installed, persistence cannot be opened, or metrics cannot be
    /// registered.
    pub async fn from_config_path(path: impl AsRef<Path>) -> AppResult<Self> {
        let (mut cfg, watcher) = watch(path.as_ref().to_path_buf(), CONFIG_POLL_INTERVAL)?;

        init_logging(&LoggingConfig {
            level: &cfg.log_level,
            format: LogFormat::infer(),
            build_sha: build_sha(),
        })
        .map_err(AppError::Logging)?;

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        let store = Store::new(&database_url).await.map_err(AppError::Store)?;

        apply_runtime_overrides(&store, &mut cfg).await;

        let metrics = Metrics::new().map_err(AppError::Metrics)?;
        let events = EventBus::new();
        let precision = PrecisionTracker::new();
        let client: Arc<dyn TorrentClient> =
            Arc::new(QbittorrentClient::new(&cfg.host, &cfg.username, &cfg.password));

        info!(host = %cfg.host, target_speed_kib = cfg.target_speed_kib, "configuration loaded");

        Ok(Self {
            config: Arc::new(RwLock::new(Arc::new(cfg))),
            store,
            events,
            metrics,
            precision,
            client,
            watcher: Some(watcher),
        })
    }

    /// Builds the [`Coordinator`], restoring any persisted torrent state
    /// and aggregate stats, and spawns the background config-watch task.
    pub async fn into_coordinator(mut self) -> (Coordinator, JoinHandle<()>) {
        let watcher = self.watcher.take().expect("watcher taken exactly once");
        let watch_handle =
            spawn_config_watch_task(watcher, Arc::clone(&self.config), self.events.clone());
        let coordinator = Coordinator::new(
            self.client,
            self.store,
            self.events,
            self.metrics,
            self.precision,
            self.config,
        )
        .await;
        (coordinator, watch_handle)
    }
}

async fn apply_runtime_overrides(store: &Store, cfg: &mut EngineConfig) {
    match store.runtime_config("host").await {
        Ok(Some(value)) => {
            info!("applying persisted runtime override for host");
            cfg.host = value;
        }
        Ok(None) => {}
        Err(err) => warn!(error = %err, "failed to read runtime override for host"),
    }
    match store.runtime_config("username").await {
        Ok(Some(value)) => {
            info!("applying persisted runtime override for username");
            cfg.username = value;
        }
        Ok(None) => {}
        Err(err) => warn!(error = %err, "failed to read runtime override for username"),
    }
    match store.runtime_config("password").await {
        Ok(Some(value)) => {
            info!("applying persisted runtime override for password");
            cfg.password = value;
        }
        Ok(None) => {}
        Err(err) => warn!(error = %err, "failed to read runtime override for password"),
    }
}

fn spawn_config_watch_task(
    mut watcher: ConfigWatcher,
    shared: Arc<RwLock<Arc<EngineConfig>>>,
    events: EventBus,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let cfg = watcher.next().await;
            info!("configuration file reloaded");
            {
                let mut guard = shared.write().expect("config lock poisoned");
                *guard = Arc::new(cfg);
            }
            events.publish(Event::SettingsChanged {
                description: "configuration file reloaded".to_string(),
            });
        }
    })
}

/// Runs the daemon until a termination signal is received.
///
/// # Errors
///
/// Returns an error if bootstrap fails or the coordinator hits a
/// non-recoverable client failure.
pub async fn run(config_path: impl AsRef<Path>) -> AppResult<()> {
    let deps = BootstrapDependencies::from_config_path(config_path).await?;
    let (mut coordinator, watch_handle) = deps.into_coordinator().await;
    let result = coordinator.run_until_shutdown().await;
    watch_handle.abort();
    result
}

/// Runs exactly one coordinator tick and returns, useful for cron-style
/// invocation or debugging.
///
/// # Errors
///
/// Returns an error if bootstrap fails or the tick hits a non-recoverable
/// client failure.
pub async fn run_once(config_path: impl AsRef<Path>) -> AppResult<()> {
    let deps = BootstrapDependencies::from_config_path(config_path).await?;
    let (mut coordinator, watch_handle) = deps.into_coordinator().await;
    let result = coordinator.run_once().await;
    watch_handle.abort();
    result
}
