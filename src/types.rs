//! Core types and events for feed-refresh

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::{Error, FetchError, RequestError};

/// Unique identifier for a subscribed source
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(pub i64);

impl SourceId {
    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for SourceId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for SourceId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for SourceId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for SourceId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// One subscribed entity whose latest items are fetched each run
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct Source {
    /// Registry identifier
    pub id: SourceId,
    /// Identifier of the service that hosts the source
    pub service_id: i32,
    /// Canonical URL
    pub url: String,
    /// Display name
    pub name: String,
}

impl Source {
    /// Provenance key used when wrapping fetch failures (`"<service_id>:<url>"`)
    pub fn request_key(&self) -> String {
        format!("{}:{}", self.service_id, self.url)
    }
}

/// A single item discovered in a source
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedItem {
    /// Item URL (unique within its source)
    pub url: String,
    /// Item title
    pub title: String,
    /// Author or uploader name
    pub uploader: Option<String>,
    /// Publication time, when the source provides one
    pub published_at: Option<DateTime<Utc>>,
}

/// Everything a successful fetch learned about a source
#[derive(Debug, Default)]
pub struct FetchedInfo {
    /// Source name as currently reported by the service
    pub name: String,
    /// Avatar or logo URL
    pub avatar_url: Option<String>,
    /// Source description
    pub description: Option<String>,
    /// Subscriber count, when the service exposes one
    pub subscriber_count: Option<i64>,
    /// Latest items
    pub items: Vec<FeedItem>,
    /// Non-fatal per-item errors surfaced by the fetch
    pub errors: Vec<FetchError>,
}

/// Per-source result of a fetch attempt
#[derive(Debug)]
pub enum FetchOutcome {
    /// The source was fetched
    Success {
        /// Source that was fetched
        source_id: SourceId,
        /// Fetched information
        info: FetchedInfo,
    },
    /// The fetch failed; the error carries the source's provenance
    Failure(RequestError),
}

impl FetchOutcome {
    /// Source this outcome belongs to
    pub fn source_id(&self) -> SourceId {
        match self {
            FetchOutcome::Success { source_id, .. } => *source_id,
            FetchOutcome::Failure(err) => err.source_id,
        }
    }

    /// Text shown to the user when this outcome is applied
    pub fn description(&self) -> &str {
        match self {
            FetchOutcome::Success { info, .. } => &info.name,
            FetchOutcome::Failure(_) => "",
        }
    }
}

/// A bounded group of outcomes committed to persistence as one transaction
#[derive(Debug, Default)]
pub struct PersistenceBatch {
    entries: Vec<FetchOutcome>,
}

impl PersistenceBatch {
    /// Create an empty batch with room for `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Append an outcome
    pub fn push(&mut self, outcome: FetchOutcome) {
        self.entries.push(outcome);
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in receipt order
    pub fn entries(&self) -> &[FetchOutcome] {
        &self.entries
    }

    /// Consume the batch, yielding its entries in receipt order
    pub fn into_entries(self) -> Vec<FetchOutcome> {
        self.entries
    }
}

/// A failure recorded during a run that did not abort it
#[derive(Debug, thiserror::Error)]
pub enum SoftError {
    /// Fetching a whole source failed
    #[error(transparent)]
    Source(RequestError),

    /// A single item inside a successful fetch could not be read
    #[error("{error}")]
    Item {
        /// Source the item belongs to
        source_id: SourceId,
        /// Error reported by the fetch client
        error: FetchError,
    },
}

impl SoftError {
    /// Source the error belongs to
    pub fn source_id(&self) -> SourceId {
        match self {
            SoftError::Source(err) => err.source_id,
            SoftError::Item { source_id, .. } => *source_id,
        }
    }
}

/// Result of a successful finalize step
#[derive(Debug)]
pub struct RefreshSummary {
    /// Every soft error recorded during the run
    pub errors: Vec<SoftError>,
    /// Time the run completed
    pub completed_at: DateTime<Utc>,
    /// Items removed by orphan/retention cleanup
    pub removed_items: u64,
}

/// Phase of the refresh state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    /// No run is active
    Idle,
    /// Reading the source list
    Starting,
    /// Fetching sources
    Fetching,
    /// Flushing results and cleaning up the store
    Finalizing,
    /// The run completed
    Done,
    /// The run was aborted
    Failed,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunPhase::Idle => "idle",
            RunPhase::Starting => "starting",
            RunPhase::Fetching => "fetching",
            RunPhase::Finalizing => "finalizing",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Lifecycle events published by [`crate::FeedRefresher`]
#[derive(Clone, Debug)]
pub enum Event {
    /// Progress counters changed (both -1 while finalizing)
    ProgressUpdated {
        /// Outcomes applied so far
        current: i64,
        /// Sources in the run
        total: i64,
    },

    /// A phase-transition message for display
    PhaseMessage {
        /// Human-readable message
        message: String,
    },

    /// The run had nothing to do
    Idle,

    /// The run completed; soft errors are bundled for reporting
    Succeeded {
        /// Soft errors recorded during the run
        errors: Arc<Vec<SoftError>>,
    },

    /// The run was aborted
    Failed {
        /// Cause of the abort
        error: Arc<Error>,
    },
}
