//! # feed-refresh
//!
//! Refresh pipeline for a subscription feed: fetch every subscribed source
//! with bounded parallelism, persist the results in batches, tolerate
//! per-source failures, and report live progress.
//!
//! ## Design Philosophy
//!
//! feed-refresh is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to lifecycle events, no polling required
//! - **Pluggable** - The registry, fetch client, store and presentation layer are traits
//! - **Sensible defaults** - SQLite persistence and an RSS/Atom HTTP client out of the box
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use feed_refresh::{Config, Database, Event, FeedRefresher, HttpFeedFetcher, TracingNotificationSink};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let db = Arc::new(Database::new(&config.persistence.database_path).await?);
//!     let fetcher = Arc::new(HttpFeedFetcher::new(&config.http)?);
//!
//!     let refresher = FeedRefresher::new(
//!         &config,
//!         db.clone(),
//!         fetcher,
//!         db,
//!         Arc::new(TracingNotificationSink),
//!     )?;
//!
//!     let mut events = refresher.subscribe();
//!     let run = refresher.start()?;
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             Event::Succeeded { errors } => {
//!                 println!("{} sources failed to update", errors.len());
//!                 break;
//!             }
//!             Event::Failed { error } => {
//!                 println!("refresh failed: {}", error);
//!                 break;
//!             }
//!             Event::Idle => break,
//!             _ => {}
//!         }
//!     }
//!     run.wait().await;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Outcome batching and persistence
pub mod aggregator;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Bounded-parallel fetching
pub mod fetch;
/// Throttled progress notifications
pub mod notifier;
/// Progress counters
pub mod progress;
/// Refresh state machine
pub mod refresher;
/// Registry and store gateways
pub mod store;
/// Core types and events
pub mod types;

#[cfg(test)]
mod test_helpers;

// Re-export commonly used types
pub use config::{Config, HttpConfig, PersistenceConfig, RefreshConfig};
pub use db::Database;
pub use error::{DatabaseError, Error, ErrorKind, FetchError, RequestError, Result, classify};
pub use fetch::{FeedFetcher, FetchWorkerPool, HttpFeedFetcher};
pub use notifier::{
    NotificationSink, NotificationUpdate, ThrottledNotifier, TracingNotificationSink,
};
pub use progress::{Progress, ProgressTracker};
pub use refresher::{FeedRefresher, RunHandle};
pub use store::{FeedStore, SourceRegistry};
pub use types::{
    Event, FeedItem, FetchOutcome, FetchedInfo, RefreshSummary, RunPhase, SoftError, Source,
    SourceId,
};
