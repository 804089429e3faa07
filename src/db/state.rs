//! Runtime state tracking: last successful refresh.

use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::Database;

const LAST_REFRESHED_KEY: &str = "last_refreshed";

impl Database {
    /// Record when the last successful refresh completed
    pub async fn set_last_refreshed(&self, at: DateTime<Utc>) -> Result<()> {
        let now = Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO runtime_state (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(LAST_REFRESHED_KEY)
        .bind(at.to_rfc3339())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to set last refresh time: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// When the last successful refresh completed, if one ever has
    pub async fn last_refreshed(&self) -> Result<Option<DateTime<Utc>>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM runtime_state WHERE key = ?")
                .bind(LAST_REFRESHED_KEY)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to read last refresh time: {}",
                        e
                    )))
                })?;

        let Some(value) = value else {
            return Ok(None);
        };

        let parsed = DateTime::parse_from_rfc3339(&value).map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Invalid last refresh time '{}': {}",
                value, e
            )))
        })?;

        Ok(Some(parsed.with_timezone(&Utc)))
    }
}
