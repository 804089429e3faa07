//! Subscription registry CRUD.

use crate::error::DatabaseError;
use crate::types::SourceId;
use crate::{Error, Result};

use super::{Database, NewSubscription, Subscription};

impl Database {
    /// Insert a new subscription, returning its ID
    pub async fn add_subscription(&self, sub: &NewSubscription) -> Result<SourceId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO subscriptions (service_id, url, name, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(sub.service_id)
        .bind(&sub.url)
        .bind(&sub.name)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert subscription: {}",
                e
            )))
        })?;

        Ok(SourceId(result.last_insert_rowid()))
    }

    /// Delete a subscription (cascades to its feed items)
    pub async fn remove_subscription(&self, id: SourceId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete subscription: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Get all subscriptions in insertion order
    pub async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let subs = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, service_id, url, name, avatar_url, description,
                   subscriber_count, created_at
            FROM subscriptions
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get subscriptions: {}",
                e
            )))
        })?;

        Ok(subs)
    }

    /// Get subscription by ID
    pub async fn get_subscription(&self, id: SourceId) -> Result<Option<Subscription>> {
        let sub = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, service_id, url, name, avatar_url, description,
                   subscriber_count, created_at
            FROM subscriptions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get subscription: {}",
                e
            )))
        })?;

        Ok(sub)
    }
}
