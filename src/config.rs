//! Runtime configuration parsed from environment variables.
//!
//! Every knob has a default, so an empty environment yields a working
//! configuration. Unparseable values fall back to the default as well.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::services::persistence::{HttpStore, MemoryStore, PersistError, SideTableStore};
use crate::services::task::SyncSchedule;

pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 150;
pub const DEFAULT_THEME_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_SIDETABLE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SIDETABLE_DIR: &str = "./sidetables";
pub const DEFAULT_PORT: u16 = 8190;

/// Client-side settings: panels, theme watcher, side-table client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Period of the per-entry synchronization check. Zero disables polling.
    pub sync_interval: Duration,
    pub theme_poll_interval: Duration,
    /// Base URL of the side-table server. `None` keeps persistence local.
    pub sidetable_url: Option<String>,
    pub sidetable_timeout: Duration,
}

impl CollectorConfig {
    /// Build config from environment variables.
    ///
    /// Optional:
    /// - `COLLECTOR_SYNC_INTERVAL_MS`: default 150, `0` = manual sync only
    /// - `THEME_POLL_INTERVAL_MS`: default 500
    /// - `SIDETABLE_URL`: side-table server base URL
    /// - `SIDETABLE_TIMEOUT_SECS`: default 10
    #[must_use]
    pub fn from_env() -> Self {
        let sidetable_url = std::env::var("SIDETABLE_URL")
            .ok()
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        Self {
            sync_interval: Duration::from_millis(env_parse("COLLECTOR_SYNC_INTERVAL_MS", DEFAULT_SYNC_INTERVAL_MS)),
            theme_poll_interval: Duration::from_millis(env_parse(
                "THEME_POLL_INTERVAL_MS",
                DEFAULT_THEME_POLL_INTERVAL_MS,
            )),
            sidetable_url,
            sidetable_timeout: Duration::from_secs(env_parse(
                "SIDETABLE_TIMEOUT_SECS",
                DEFAULT_SIDETABLE_TIMEOUT_SECS,
            )),
        }
    }

    #[must_use]
    pub fn sync_schedule(&self) -> SyncSchedule {
        if self.sync_interval.is_zero() {
            SyncSchedule::Manual
        } else {
            SyncSchedule::Every(self.sync_interval)
        }
    }

    /// The side-table server when `sidetable_url` is set, otherwise an
    /// in-process store that lives as long as the returned handle.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Request`] if the HTTP client cannot be built.
    pub fn sidetable_store(&self) -> Result<Arc<dyn SideTableStore>, PersistError> {
        match &self.sidetable_url {
            Some(url) => Ok(Arc::new(HttpStore::new(url, self.sidetable_timeout)?)),
            None => Ok(Arc::new(MemoryStore::new())),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_millis(DEFAULT_SYNC_INTERVAL_MS),
            theme_poll_interval: Duration::from_millis(DEFAULT_THEME_POLL_INTERVAL_MS),
            sidetable_url: None,
            sidetable_timeout: Duration::from_secs(DEFAULT_SIDETABLE_TIMEOUT_SECS),
        }
    }
}

/// Side-table server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub sidetable_dir: PathBuf,
}

impl ServerConfig {
    /// Optional:
    /// - `PORT`: default 8190
    /// - `SIDETABLE_DIR`: default `./sidetables`
    #[must_use]
    pub fn from_env() -> Self {
        let sidetable_dir = std::env::var("SIDETABLE_DIR")
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_SIDETABLE_DIR), PathBuf::from);

        Self { port: env_parse("PORT", DEFAULT_PORT), sidetable_dir }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
