//! Database layer for feed-refresh
//!
//! Handles SQLite persistence for subscriptions, feed items, and runtime state.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - `migrations`: database lifecycle and schema migrations
//! - `subscriptions`: subscription registry CRUD
//! - `feed`: batch commits (item upserts, metadata updates) and orphan/retention cleanup
//! - `state`: runtime state (last refresh time)
//!
//! [`Database`] implements [`crate::store::SourceRegistry`] and
//! [`crate::store::FeedStore`], so it can back a [`crate::FeedRefresher`]
//! directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::time::Duration;

use crate::error::Result;
use crate::store::{FeedStore, SourceRegistry};
use crate::types::{PersistenceBatch, Source, SourceId};

mod feed;
mod migrations;
mod state;
mod subscriptions;

/// New subscription to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewSubscription {
    /// Identifier of the hosting service
    pub service_id: i32,
    /// Canonical URL
    pub url: String,
    /// Display name
    pub name: String,
}

/// Subscription record from database
#[derive(Debug, Clone, FromRow)]
pub struct Subscription {
    /// Unique database ID
    pub id: SourceId,
    /// Identifier of the hosting service
    pub service_id: i32,
    /// Canonical URL
    pub url: String,
    /// Display name
    pub name: String,
    /// Avatar or logo URL
    pub avatar_url: Option<String>,
    /// Description reported by the service
    pub description: Option<String>,
    /// Subscriber count reported by the service
    pub subscriber_count: Option<i64>,
    /// Unix timestamp when the subscription was created
    pub created_at: i64,
}

impl From<Subscription> for Source {
    fn from(sub: Subscription) -> Self {
        Source {
            id: sub.id,
            service_id: sub.service_id,
            url: sub.url,
            name: sub.name,
        }
    }
}

/// Feed item record from database
#[derive(Debug, Clone, FromRow)]
pub struct StoredItem {
    /// Unique database ID
    pub id: i64,
    /// Subscription the item belongs to
    pub subscription_id: SourceId,
    /// Item URL
    pub url: String,
    /// Item title
    pub title: String,
    /// Author or uploader
    pub uploader: Option<String>,
    /// Unix timestamp of publication, if known
    pub published_at: Option<i64>,
    /// Unix timestamp of the last refresh that saw this item
    pub fetched_at: i64,
}

/// Database handle for feed-refresh
pub struct Database {
    pool: SqlitePool,
}

#[async_trait]
impl SourceRegistry for Database {
    async fn list_sources(&self) -> Result<Vec<Source>> {
        let subscriptions = self.list_subscriptions().await?;
        Ok(subscriptions.into_iter().map(Source::from).collect())
    }
}

#[async_trait]
impl FeedStore for Database {
    async fn commit_batch(&self, batch: &PersistenceBatch) -> Result<()> {
        Database::commit_batch(self, batch).await
    }

    async fn remove_orphans_or_stale(&self, retention: Duration) -> Result<u64> {
        Database::remove_orphans_or_stale(self, retention).await
    }

    async fn set_last_refreshed(&self, at: DateTime<Utc>) -> Result<()> {
        Database::set_last_refreshed(self, at).await
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
