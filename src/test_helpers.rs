//! Shared in-memory collaborators for unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, FetchError, Result};
use crate::fetch::FeedFetcher;
use crate::notifier::{NotificationSink, NotificationUpdate};
use crate::store::{FeedStore, SourceRegistry};
use crate::types::{FeedItem, FetchOutcome, FetchedInfo, PersistenceBatch, Source, SourceId};

/// Source with a predictable URL and name
pub(crate) fn source(id: i64) -> Source {
    Source {
        id: SourceId(id),
        service_id: 0,
        url: format!("https://example.com/{id}"),
        name: format!("Source {id}"),
    }
}

/// Sources with ids `1..=n`
pub(crate) fn sources(n: i64) -> Vec<Source> {
    (1..=n).map(source).collect()
}

/// Item with a predictable URL
pub(crate) fn item(source_id: i64, n: usize) -> FeedItem {
    FeedItem {
        url: format!("https://example.com/{source_id}/item/{n}"),
        title: format!("Item {n}"),
        uploader: None,
        published_at: Some(Utc::now()),
    }
}

type ErrorFactory = Arc<dyn Fn() -> FetchError + Send + Sync>;

/// How [`MockFetcher`] answers for one source
#[derive(Clone)]
pub(crate) enum Behavior {
    /// Return `items` items and `item_errors` embedded per-item errors
    Succeed { items: usize, item_errors: usize },
    /// Fail with the error produced by the factory
    Fail(ErrorFactory),
}

impl Behavior {
    pub(crate) fn fail(f: impl Fn() -> FetchError + Send + Sync + 'static) -> Self {
        Behavior::Fail(Arc::new(f))
    }
}

/// Scripted [`FeedFetcher`] that records concurrency
pub(crate) struct MockFetcher {
    behaviors: HashMap<SourceId, Behavior>,
    default: Behavior,
    delay: Duration,
    delays: HashMap<SourceId, Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl MockFetcher {
    /// Every source succeeds with two items
    pub(crate) fn new() -> Self {
        Self {
            behaviors: HashMap::new(),
            default: Behavior::Succeed {
                items: 2,
                item_errors: 0,
            },
            delay: Duration::ZERO,
            delays: HashMap::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with(mut self, id: i64, behavior: Behavior) -> Self {
        self.behaviors.insert(SourceId(id), behavior);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn with_source_delay(mut self, id: i64, delay: Duration) -> Self {
        self.delays.insert(SourceId(id), delay);
        self
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedFetcher for MockFetcher {
    async fn fetch(
        &self,
        source: &Source,
        cancel_token: &CancellationToken,
    ) -> std::result::Result<FetchedInfo, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.get(&source.id).copied().unwrap_or(self.delay);
        let cancelled = if delay.is_zero() {
            tokio::task::yield_now().await;
            false
        } else {
            tokio::select! {
                _ = cancel_token.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if cancelled {
            return Err(FetchError::Cancelled);
        }

        match self.behaviors.get(&source.id).unwrap_or(&self.default) {
            Behavior::Succeed { items, item_errors } => Ok(FetchedInfo {
                name: source.name.clone(),
                items: (0..*items).map(|n| item(source.id.get(), n)).collect(),
                errors: (0..*item_errors)
                    .map(|n| FetchError::Parse(format!("item {n} unreadable")))
                    .collect(),
                ..FetchedInfo::default()
            }),
            Behavior::Fail(make) => Err(make()),
        }
    }
}

/// Fixed-list [`SourceRegistry`]
pub(crate) struct MockRegistry {
    sources: Vec<Source>,
    calls: AtomicUsize,
}

impl MockRegistry {
    pub(crate) fn new(sources: Vec<Source>) -> Self {
        Self {
            sources,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceRegistry for MockRegistry {
    async fn list_sources(&self) -> Result<Vec<Source>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.sources.clone())
    }
}

#[derive(Default)]
pub(crate) struct StoreState {
    /// Entry count of every committed batch, in commit order
    pub(crate) commits: Vec<usize>,
    /// Items upserted per source
    pub(crate) items: HashMap<SourceId, Vec<FeedItem>>,
    /// Sources whose metadata was refreshed
    pub(crate) metadata_updates: Vec<SourceId>,
    pub(crate) cleanup_calls: usize,
    pub(crate) last_refreshed: Option<DateTime<Utc>>,
}

/// In-memory [`FeedStore`]
#[derive(Default)]
pub(crate) struct MockStore {
    pub(crate) state: Mutex<StoreState>,
    /// Zero-based index of the commit that fails
    pub(crate) fail_commit: Option<usize>,
    pub(crate) fail_cleanup: bool,
}

impl MockStore {
    pub(crate) fn failing_commit(index: usize) -> Self {
        Self {
            fail_commit: Some(index),
            ..Self::default()
        }
    }

    pub(crate) fn failing_cleanup() -> Self {
        Self {
            fail_cleanup: true,
            ..Self::default()
        }
    }

    pub(crate) fn commits(&self) -> Vec<usize> {
        self.state.lock().unwrap().commits.clone()
    }

    pub(crate) fn item_count(&self) -> usize {
        self.state.lock().unwrap().items.values().map(Vec::len).sum()
    }

    pub(crate) fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.state.lock().unwrap().last_refreshed
    }

    pub(crate) fn cleanup_calls(&self) -> usize {
        self.state.lock().unwrap().cleanup_calls
    }
}

#[async_trait]
impl FeedStore for MockStore {
    async fn commit_batch(&self, batch: &PersistenceBatch) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if self.fail_commit == Some(state.commits.len()) {
            return Err(Error::Other("commit failed".to_string()));
        }

        for outcome in batch.entries() {
            if let FetchOutcome::Success { source_id, info } = outcome {
                let stored = state.items.entry(*source_id).or_default();
                for item in &info.items {
                    if !stored.iter().any(|s| s.url == item.url) {
                        stored.push(item.clone());
                    }
                }
                state.metadata_updates.push(*source_id);
            }
        }
        state.commits.push(batch.len());
        Ok(())
    }

    async fn remove_orphans_or_stale(&self, _retention: Duration) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        state.cleanup_calls += 1;
        if self.fail_cleanup {
            return Err(Error::Other("cleanup failed".to_string()));
        }
        Ok(0)
    }

    async fn set_last_refreshed(&self, at: DateTime<Utc>) -> Result<()> {
        self.state.lock().unwrap().last_refreshed = Some(at);
        Ok(())
    }
}

/// [`NotificationSink`] that records everything it is shown
#[derive(Default)]
pub(crate) struct RecordingSink {
    updates: Mutex<Vec<NotificationUpdate>>,
    dismissed: AtomicUsize,
}

impl RecordingSink {
    pub(crate) fn updates(&self) -> Vec<NotificationUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub(crate) fn descriptions(&self) -> Vec<String> {
        self.updates()
            .into_iter()
            .map(|u| u.description)
            .collect()
    }

    pub(crate) fn dismissed(&self) -> usize {
        self.dismissed.load(Ordering::SeqCst)
    }
}

impl NotificationSink for RecordingSink {
    fn show(&self, update: &NotificationUpdate) {
        self.updates.lock().unwrap().push(update.clone());
    }

    fn dismiss(&self) {
        self.dismissed.fetch_add(1, Ordering::SeqCst);
    }
}
