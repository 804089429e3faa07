//! Database lifecycle and schema migrations.

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::SqliteConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use std::path::Path;
use std::str::FromStr;

use super::Database;

/// Statements of schema v1, applied in order inside one transaction
const SCHEMA_V1: &[(&str, &str)] = &[
    (
        "subscriptions table",
        r#"
        CREATE TABLE subscriptions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            service_id INTEGER NOT NULL,
            url TEXT NOT NULL,
            name TEXT NOT NULL,
            avatar_url TEXT,
            description TEXT,
            subscriber_count INTEGER,
            created_at INTEGER NOT NULL,
            UNIQUE (service_id, url)
        )
        "#,
    ),
    (
        "feed_items table",
        r#"
        CREATE TABLE feed_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subscription_id INTEGER NOT NULL
                REFERENCES subscriptions(id) ON DELETE CASCADE,
            url TEXT NOT NULL,
            title TEXT NOT NULL,
            uploader TEXT,
            published_at INTEGER,
            fetched_at INTEGER NOT NULL,
            UNIQUE (subscription_id, url)
        )
        "#,
    ),
    (
        "feed_items publication index",
        "CREATE INDEX idx_feed_items_published ON feed_items(published_at)",
    ),
    (
        "runtime_state table",
        r#"
        CREATE TABLE runtime_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    ),
];

fn migration_failed(what: impl std::fmt::Display) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| {
        Error::Database(DatabaseError::MigrationFailed(format!(
            "{}: {}",
            what, e
        )))
    }
}

impl Database {
    /// Open (or create) the database at `path` and bring its schema up to date
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                )))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Invalid database path {}: {}",
                    path.display(),
                    e
                )))
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to open {}: {}",
                path.display(),
                e
            )))
        })?;

        let db = Self { pool };
        db.migrate().await?;

        tracing::debug!(path = %path.display(), "Feed database ready");
        Ok(db)
    }

    /// Close the connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection for migrations: {}",
                e
            )))
        })?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY, applied_at INTEGER NOT NULL)",
        )
        .execute(&mut *conn)
        .await
        .map_err(migration_failed("Failed to create schema_version"))?;

        let version = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(version) FROM schema_version")
            .fetch_optional(&mut *conn)
            .await
            .map_err(migration_failed("Failed to read schema version"))?
            .flatten()
            .unwrap_or(0);

        if version < 1 {
            Self::apply(&mut conn, 1, SCHEMA_V1).await?;
        }

        Ok(())
    }

    /// Apply one schema version atomically
    async fn apply(
        conn: &mut SqliteConnection,
        version: i64,
        statements: &[(&str, &str)],
    ) -> Result<()> {
        tracing::info!(version, "Applying database migration");

        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(migration_failed(format!("Failed to begin migration v{}", version)))?;

        let result = async {
            for (what, sql) in statements {
                sqlx::query(*sql)
                    .execute(&mut *conn)
                    .await
                    .map_err(migration_failed(format!("Failed to create {}", what)))?;
            }
            sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
                .bind(version)
                .bind(chrono::Utc::now().timestamp())
                .execute(&mut *conn)
                .await
                .map_err(migration_failed(format!("Failed to record migration v{}", version)))?;
            Ok::<(), Error>(())
        }
        .await;

        if let Err(e) = result {
            sqlx::query("ROLLBACK").execute(&mut *conn).await.ok();
            return Err(e);
        }

        sqlx::query("COMMIT")
            .execute(&mut *conn)
            .await
            .map_err(migration_failed(format!("Failed to commit migration v{}", version)))?;

        Ok(())
    }
}
