//! File-backed configuration loading and change watching.
//!
//! Grounded on `Config.load()`'s mtime read and `ConfigWatcher`'s
//! poll-and-apply loop shape, adapted from polling a database revision to
//! polling a file's modification time.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::time::{sleep, Duration};
use tracing::warn;

use crate::error::{ConfigError, ConfigResult};
use crate::model::EngineConfig;
use crate::validate::validate;

/// Reads and validates the config file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid JSON, or fails
/// field validation.
pub fn load(path: impl AsRef<Path>) -> ConfigResult<EngineConfig> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let cfg: EngineConfig =
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
    validate(&cfg)?;
    Ok(cfg)
}

fn file_mtime(path: &Path) -> ConfigResult<SystemTime> {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
}

/// Loads `path` and returns a [`ConfigWatcher`] that polls it for changes.
///
/// # Errors
///
/// Returns an error if the initial load fails.
pub fn watch(path: impl Into<PathBuf>, poll_interval: Duration) -> ConfigResult<(EngineConfig, ConfigWatcher)> {
    let path = path.into();
    let cfg = load(&path)?;
    let last_mtime = file_mtime(&path)?;
    let watcher = ConfigWatcher {
        path,
        poll_interval,
        last_mtime,
    };
    Ok((cfg, watcher))
}

/// Polls a config file for mtime changes, reloading and re-validating on
/// each change. A malformed reload is logged and skipped rather than
/// propagated, so a typo mid-edit never crashes the daemon.
pub struct ConfigWatcher {
    path: PathBuf,
    poll_interval: Duration,
    last_mtime: SystemTime,
}

impl ConfigWatcher {
    /// Waits until the config file's mtime advances, then returns the
    /// reloaded, validated configuration.
    pub async fn next(&mut self) -> EngineConfig {
        loop {
            sleep(self.poll_interval).await;

            let mtime = match file_mtime(&self.path) {
                Ok(mtime) => mtime,
                Err(err) => {
                    warn!(error = %err, "failed to stat config file; will retry");
                    continue;
                }
            };
            if mtime <= self.last_mtime {
                continue;
            }

            match load(&self.path) {
                Ok(cfg) => {
                    self.last_mtime = mtime;
                    return cfg;
                }
                Err(err) => {
                    warn!(error = %err, "config reload failed; keeping previous configuration");
                    self.last_mtime = mtime;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("config.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn load_parses_and_validates() {
        let dir = tempdir();
        let path = write_config(
            dir.path(),
            r#"{"host":"http://127.0.0.1:8080","username":"a","password":"b","target_speed_kib":5000}"#,
        );
        let cfg = load(&path).unwrap();
        assert_eq!(cfg.target_speed_kib, 5000);
    }

    #[test]
    fn load_rejects_invalid_json() {
        let dir = tempdir();
        let path = write_config(dir.path(), "not json");
        assert!(load(&path).is_err());
    }

    #[test]
    fn load_rejects_failing_validation() {
        let dir = tempdir();
        let path = write_config(
            dir.path(),
            r#"{"host":"","username":"a","password":"b","target_speed_kib":5000}"#,
        );
        assert!(load(&path).is_err());
    }

    #[tokio::test]
    async fn watcher_picks_up_reload_after_mtime_change() {
        let dir = tempdir();
        let path = write_config(
            dir.path(),
            r#"{"host":"http://127.0.0.1:8080","username":"a","password":"b","target_speed_kib":5000}"#,
        );
        let (cfg, mut watcher) = watch(path.clone(), Duration::from_millis(5)).unwrap();
        assert_eq!(cfg.target_speed_kib, 5000);

        tokio::time::sleep(Duration::from_millis(20)).await;
        write_config(
            dir.path(),
            r#"{"host":"http://127.0.0.1:8080","username":"a","password":"b","target_speed_kib":9000}"#,
        );

        let reloaded = tokio::time::timeout(Duration::from_secs(2), watcher.next())
            .await
            .expect("watcher should observe the mtime change");
        assert_eq!(reloaded.target_speed_kib, 9000);
    }

    fn tempdir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }
}
