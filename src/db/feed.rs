//! Feed item persistence: batch commits and cleanup.

use chrono::Utc;
use sqlx::SqliteConnection;
use std::time::Duration;

use crate::error::DatabaseError;
use crate::types::{FeedItem, FetchOutcome, FetchedInfo, PersistenceBatch, SourceId};
use crate::{Error, Result};

use super::{Database, StoredItem};

impl Database {
    /// Apply a batch of outcomes in a single transaction.
    ///
    /// Successful outcomes upsert their items and refresh the subscription's
    /// metadata. Items for subscriptions removed since the run started are
    /// skipped. On any error the transaction is rolled back.
    pub async fn commit_batch(&self, batch: &PersistenceBatch) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::TransactionFailed(format!(
                "Failed to begin batch transaction: {}",
                e
            )))
        })?;
        let now = Utc::now().timestamp();

        for outcome in batch.entries() {
            if let FetchOutcome::Success { source_id, info } = outcome {
                Self::upsert_items(&mut tx, *source_id, &info.items, now).await?;
                Self::update_subscription_from_info(&mut tx, *source_id, info).await?;
            }
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::TransactionFailed(format!(
                "Failed to commit batch of {} entries: {}",
                batch.len(),
                e
            )))
        })?;

        Ok(())
    }

    async fn upsert_items(
        conn: &mut SqliteConnection,
        source_id: SourceId,
        items: &[FeedItem],
        fetched_at: i64,
    ) -> Result<()> {
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO feed_items (subscription_id, url, title, uploader, published_at, fetched_at)
                SELECT ?, ?, ?, ?, ?, ?
                WHERE EXISTS (SELECT 1 FROM subscriptions WHERE id = ?)
                ON CONFLICT (subscription_id, url) DO UPDATE SET
                    title = excluded.title,
                    uploader = excluded.uploader,
                    published_at = COALESCE(excluded.published_at, feed_items.published_at),
                    fetched_at = excluded.fetched_at
                "#,
            )
            .bind(source_id)
            .bind(&item.url)
            .bind(&item.title)
            .bind(&item.uploader)
            .bind(item.published_at.map(|t| t.timestamp()))
            .bind(fetched_at)
            .bind(source_id)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to upsert item {} for subscription {}: {}",
                    item.url, source_id, e
                )))
            })?;
        }

        Ok(())
    }

    async fn update_subscription_from_info(
        conn: &mut SqliteConnection,
        source_id: SourceId,
        info: &FetchedInfo,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET name = COALESCE(NULLIF(?, ''), name),
                avatar_url = COALESCE(?, avatar_url),
                description = COALESCE(?, description),
                subscriber_count = COALESCE(?, subscriber_count)
            WHERE id = ?
            "#,
        )
        .bind(&info.name)
        .bind(&info.avatar_url)
        .bind(&info.description)
        .bind(info.subscriber_count)
        .bind(source_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update subscription {}: {}",
                source_id, e
            )))
        })?;

        Ok(())
    }

    /// Remove items whose subscription is gone or that were published more
    /// than `retention` ago (items without a publication time age from when
    /// they were last fetched). Returns the number of items removed.
    pub async fn remove_orphans_or_stale(&self, retention: Duration) -> Result<u64> {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(retention)
            .map(|t| t.timestamp())
            .unwrap_or(i64::MIN);

        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::TransactionFailed(format!(
                "Failed to begin cleanup transaction: {}",
                e
            )))
        })?;

        let orphans = sqlx::query(
            "DELETE FROM feed_items WHERE subscription_id NOT IN (SELECT id FROM subscriptions)",
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to remove orphaned items: {}",
                e
            )))
        })?
        .rows_affected();

        let stale =
            sqlx::query("DELETE FROM feed_items WHERE COALESCE(published_at, fetched_at) < ?")
                .bind(cutoff)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to remove stale items: {}",
                        e
                    )))
                })?
                .rows_affected();

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::TransactionFailed(format!(
                "Failed to commit cleanup: {}",
                e
            )))
        })?;

        tracing::debug!(orphans, stale, "Feed cleanup complete");
        Ok(orphans + stale)
    }

    /// Items stored for a subscription, newest first
    pub async fn items_for(&self, source_id: SourceId) -> Result<Vec<StoredItem>> {
        let items = sqlx::query_as::<_, StoredItem>(
            r#"
            SELECT id, subscription_id, url, title, uploader, published_at, fetched_at
            FROM feed_items
            WHERE subscription_id = ?
            ORDER BY published_at DESC, id ASC
            "#,
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get feed items: {}",
                e
            )))
        })?;

        Ok(items)
    }

    /// Total number of stored items
    pub async fn count_items(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feed_items")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count feed items: {}",
                    e
                )))
            })?;

        Ok(count)
    }
}
