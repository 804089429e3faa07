//! Configuration types for feed-refresh

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// Refresh pipeline tuning
///
/// Groups settings that control fetch parallelism, batching, and how often
/// the presentation layer is updated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// How many sources are fetched in parallel (default: 6)
    #[serde(default = "default_parallel_fetches")]
    pub parallel_fetches: usize,

    /// Number of outcomes buffered before one persistence transaction (default: 20)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Minimum interval between presentation updates (default: 1500ms)
    ///
    /// The first description of a run is always shown immediately; later ones
    /// are coalesced so that at most one is shown per period, latest wins.
    #[serde(default = "default_sampling_period")]
    pub notification_sampling_period: Duration,

    /// Capacity of the lifecycle event broadcast channel (default: 1000)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            parallel_fetches: default_parallel_fetches(),
            batch_size: default_batch_size(),
            notification_sampling_period: default_sampling_period(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Persistence settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database path (default: "./feed.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Items published longer ago than this are removed when a run finalizes
    /// (default: 13 weeks)
    #[serde(default = "default_item_retention")]
    pub item_retention: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            item_retention: default_item_retention(),
        }
    }
}

/// HTTP fetch client settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_http_timeout")]
    pub timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_http_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Main configuration for [`crate::FeedRefresher`]
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Pipeline tuning
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Persistence settings
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,
}

impl Config {
    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.refresh.parallel_fetches == 0 {
            return Err(Error::Config {
                message: "parallel_fetches must be at least 1".to_string(),
                key: Some("refresh.parallel_fetches".to_string()),
            });
        }
        if self.refresh.batch_size == 0 {
            return Err(Error::Config {
                message: "batch_size must be at least 1".to_string(),
                key: Some("refresh.batch_size".to_string()),
            });
        }
        if self.refresh.event_buffer == 0 {
            return Err(Error::Config {
                message: "event_buffer must be at least 1".to_string(),
                key: Some("refresh.event_buffer".to_string()),
            });
        }
        Ok(())
    }
}

fn default_parallel_fetches() -> usize {
    6
}

fn default_batch_size() -> usize {
    20
}

fn default_sampling_period() -> Duration {
    Duration::from_millis(1500)
}

fn default_event_buffer() -> usize {
    1000
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./feed.db")
}

fn default_item_retention() -> Duration {
    Duration::from_secs(13 * 7 * 24 * 60 * 60)
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    "feed-refresh".to_string()
}
