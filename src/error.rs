//! Error types for feed-refresh
//!
//! This module provides:
//! - The crate-wide [`Error`] and [`Result`] types
//! - [`FetchError`], raised by a single-source fetch client
//! - [`RequestError`], which attaches a source's provenance to a fetch failure
//! - [`classify`], which decides whether a fetch failure aborts the whole run

use thiserror::Error;

use crate::types::SourceId;

/// Result type alias for feed-refresh operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for feed-refresh
#[derive(Debug, Error)]
pub enum Error {
    /// A refresh run is already active
    #[error("a refresh run is already in progress")]
    AlreadyRunning,

    /// The run was cancelled before it could complete
    #[error("refresh run cancelled")]
    Cancelled,

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "batch_size")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// A fatal fetch failure that aborted the run
    #[error("fetch failed: {0}")]
    Fetch(#[from] RequestError),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// A transaction could not be committed
    #[error("transaction failed: {0}")]
    TransactionFailed(String),
}

/// Errors raised while fetching a single source
#[derive(Debug, Error)]
pub enum FetchError {
    /// Local I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection, DNS, or timeout failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote end demanded a verification/anti-automation challenge
    #[error("verification challenge required: {0}")]
    Challenge(String),

    /// Non-success HTTP status
    #[error("HTTP {code} from {url}")]
    Status {
        /// HTTP status code
        code: u16,
        /// URL that returned the status
        url: String,
    },

    /// Content could not be parsed into a feed
    #[error("parse error: {0}")]
    Parse(String),

    /// The fetch was cancelled
    #[error("fetch cancelled")]
    Cancelled,

    /// An error raised by a client layer that carries an inner cause
    #[error("{context}: {source}")]
    Wrapped {
        /// What the client was doing
        context: String,
        /// Underlying cause
        #[source]
        source: Box<FetchError>,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Wrap this error with additional context while keeping it inspectable
    pub fn context(self, context: impl Into<String>) -> Self {
        FetchError::Wrapped {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost cause, following any [`FetchError::Wrapped`] layers
    pub fn root_cause(&self) -> &FetchError {
        match self {
            FetchError::Wrapped { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
            FetchError::Transport(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::Status {
                code: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            FetchError::Other(e.to_string())
        }
    }
}

/// A fetch failure annotated with the source it came from.
///
/// `request` has the form `"<service_id>:<url>"`.
#[derive(Debug, Error)]
#[error("{request}: {cause}")]
pub struct RequestError {
    /// Provenance of the failed request
    pub request: String,
    /// Source whose fetch failed
    pub source_id: SourceId,
    /// Original cause, preserved for classification
    #[source]
    pub cause: FetchError,
}

impl RequestError {
    /// Wrap a fetch failure with a source's identifying context
    pub fn new(source: &crate::types::Source, cause: FetchError) -> Self {
        Self {
            request: source.request_key(),
            source_id: source.id,
            cause,
        }
    }

    /// Classification of the wrapped cause
    pub fn kind(&self) -> ErrorKind {
        classify(&self.cause)
    }
}

/// Whether a fetch failure aborts the run or is only recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Aborts the entire run without persisting pending results
    Fatal,
    /// Recorded in the run's error ledger; the run continues
    Soft,
}

/// Classify a fetch failure.
///
/// Transport-level failures and verification challenges are fatal, whether
/// raised directly or carried as the cause of a wrapped error. Everything
/// else is soft.
pub fn classify(error: &FetchError) -> ErrorKind {
    match error {
        FetchError::Io(_) | FetchError::Transport(_) | FetchError::Challenge(_) => {
            ErrorKind::Fatal
        }
        FetchError::Wrapped { source, .. } => classify(source),
        FetchError::Status { .. }
        | FetchError::Parse(_)
        | FetchError::Cancelled
        | FetchError::Other(_) => ErrorKind::Soft,
    }
}
