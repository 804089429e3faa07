//! Gateways to the subscription registry and the feed store.
//!
//! [`crate::db::Database`] implements both traits on SQLite. They are traits
//! so the refresh pipeline can run against any backing store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::Result;
use crate::types::{PersistenceBatch, Source};

/// Registry of subscribed sources
#[async_trait]
pub trait SourceRegistry: Send + Sync {
    /// Snapshot of the current subscriptions, in registry order
    async fn list_sources(&self) -> Result<Vec<Source>>;
}

/// Persistence gateway for fetched results
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Apply every entry of `batch` in one transaction.
    ///
    /// For each success, the fetched items are upserted under their source and
    /// the source's stored metadata is refreshed. Failures carry no writes.
    /// Either the whole batch becomes visible or none of it does.
    async fn commit_batch(&self, batch: &PersistenceBatch) -> Result<()>;

    /// Remove items whose source is gone or that were published more than
    /// `retention` ago. Returns the number of items removed.
    async fn remove_orphans_or_stale(&self, retention: Duration) -> Result<u64>;

    /// Record when the last successful refresh completed
    async fn set_last_refreshed(&self, at: DateTime<Utc>) -> Result<()>;
}
