//! Batching of fetch outcomes into persistence transactions.
//!
//! [`ResultAggregator`] groups outcomes into batches of a fixed size in
//! receipt order. Nothing reaches the [`FeedStore`] while fetching is still
//! running: batches are held until [`ResultAggregator::finalize`], which
//! commits them one transaction at a time, in order, and then folds them into
//! the run's soft-error ledger. An aborted run drops every held batch.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::store::FeedStore;
use crate::types::{FetchOutcome, PersistenceBatch, RefreshSummary, SoftError};

/// Buffers outcomes and drives batched persistence
pub struct ResultAggregator {
    store: Arc<dyn FeedStore>,
    batch_size: usize,
    retention: Duration,
    pending: PersistenceBatch,
    /// Full batches awaiting commit, in receipt order
    sealed: Vec<PersistenceBatch>,
    errors: Vec<SoftError>,
    committed_batches: usize,
}

impl ResultAggregator {
    /// Create an aggregator grouping every `batch_size` outcomes into one batch.
    ///
    /// `retention` is handed to the store's cleanup when the run finalizes.
    pub fn new(store: Arc<dyn FeedStore>, batch_size: usize, retention: Duration) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            batch_size,
            retention,
            pending: PersistenceBatch::with_capacity(batch_size),
            sealed: Vec::new(),
            errors: Vec::new(),
            committed_batches: 0,
        }
    }

    /// Add an outcome, sealing the current batch once it is full
    pub fn push(&mut self, outcome: FetchOutcome) {
        self.pending.push(outcome);
        if self.pending.len() >= self.batch_size {
            self.seal();
        }
    }

    /// Drop every held outcome without persisting it. Returns how many were dropped.
    pub fn discard_pending(&mut self) -> usize {
        let dropped = self.pending.len() + self.sealed.iter().map(PersistenceBatch::len).sum::<usize>();
        self.pending = PersistenceBatch::default();
        self.sealed.clear();
        dropped
    }

    /// Number of full batches waiting for [`ResultAggregator::finalize`]
    pub fn held_batches(&self) -> usize {
        self.sealed.len()
    }

    /// Commit every held batch in receipt order, clean up the store, and stamp
    /// the run.
    ///
    /// Returns the complete soft-error ledger. Any store failure is returned
    /// as-is and later batches are not attempted; the run cannot be considered
    /// successful without this step.
    pub async fn finalize(mut self) -> Result<RefreshSummary> {
        self.seal();
        for batch in std::mem::take(&mut self.sealed) {
            self.commit(batch).await?;
        }

        let removed_items = self.store.remove_orphans_or_stale(self.retention).await?;
        if removed_items > 0 {
            tracing::info!(removed = removed_items, "Removed orphaned or stale items");
        }

        let completed_at = Utc::now();
        self.store.set_last_refreshed(completed_at).await?;

        Ok(RefreshSummary {
            errors: self.errors,
            completed_at,
            removed_items,
        })
    }

    fn seal(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::replace(
            &mut self.pending,
            PersistenceBatch::with_capacity(self.batch_size),
        );
        self.sealed.push(batch);
    }

    async fn commit(&mut self, batch: PersistenceBatch) -> Result<()> {
        self.store.commit_batch(&batch).await?;
        self.committed_batches += 1;
        tracing::debug!(
            batch = self.committed_batches,
            entries = batch.len(),
            "Committed persistence batch"
        );

        for outcome in batch.into_entries() {
            match outcome {
                FetchOutcome::Success { source_id, info } => {
                    for error in info.errors {
                        tracing::debug!(source_id = %source_id, error = %error, "Item error");
                        self.errors.push(SoftError::Item { source_id, error });
                    }
                }
                FetchOutcome::Failure(err) => {
                    tracing::warn!(request = %err.request, error = %err.cause, "Source failed to refresh");
                    self.errors.push(SoftError::Source(err));
                }
            }
        }

        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, RequestError};
    use crate::test_helpers::{MockStore, item, source};
    use crate::types::{FetchedInfo, SourceId};

    const RETENTION: Duration = Duration::from_secs(3600);

    fn success(id: i64, items: usize, item_errors: usize) -> FetchOutcome {
        FetchOutcome::Success {
            source_id: SourceId(id),
            info: FetchedInfo {
                name: format!("Source {id}"),
                items: (0..items).map(|n| item(id, n)).collect(),
                errors: (0..item_errors)
                    .map(|n| FetchError::Parse(format!("item {n}")))
                    .collect(),
                ..FetchedInfo::default()
            },
        }
    }

    fn failure(id: i64) -> FetchOutcome {
        FetchOutcome::Failure(RequestError::new(
            &source(id),
            FetchError::Status {
                code: 500,
                url: format!("https://example.com/{id}"),
            },
        ))
    }

    #[tokio::test]
    async fn commits_ceil_m_over_b_batches() {
        let store = Arc::new(MockStore::default());
        let mut aggregator = ResultAggregator::new(store.clone(), 20, RETENTION);

        for id in 0..45 {
            aggregator.push(success(id, 1, 0));
        }
        assert!(store.commits().is_empty(), "nothing is committed before finalize");
        assert_eq!(aggregator.held_batches(), 2);

        aggregator.finalize().await.unwrap();
        let commits = store.commits();
        assert_eq!(commits, vec![20, 20, 5]);
        assert_eq!(commits.iter().sum::<usize>(), 45);
    }

    #[tokio::test]
    async fn exact_multiple_has_no_empty_trailing_batch() {
        let store = Arc::new(MockStore::default());
        let mut aggregator = ResultAggregator::new(store.clone(), 5, RETENTION);

        for id in 0..10 {
            aggregator.push(success(id, 1, 0));
        }
        aggregator.finalize().await.unwrap();

        assert_eq!(store.commits(), vec![5, 5]);
    }

    #[tokio::test]
    async fn ledger_counts_failures_and_item_errors() {
        let store = Arc::new(MockStore::default());
        let mut aggregator = ResultAggregator::new(store.clone(), 3, RETENTION);

        aggregator.push(success(1, 2, 1));
        aggregator.push(failure(2));
        aggregator.push(success(3, 1, 2));
        aggregator.push(failure(4));

        let summary = aggregator.finalize().await.unwrap();

        assert_eq!(summary.errors.len(), 2 + 1 + 2);
        let source_failures = summary
            .errors
            .iter()
            .filter(|e| matches!(e, SoftError::Source(_)))
            .count();
        assert_eq!(source_failures, 2);
        assert_eq!(store.item_count(), 3, "only successful items are persisted");
    }

    #[tokio::test]
    async fn finalize_cleans_up_and_stamps_the_run() {
        let store = Arc::new(MockStore::default());
        let aggregator = ResultAggregator::new(store.clone(), 20, RETENTION);

        let before = Utc::now();
        let summary = aggregator.finalize().await.unwrap();

        assert!(store.commits().is_empty(), "nothing to flush");
        assert_eq!(store.cleanup_calls(), 1);
        assert_eq!(summary.removed_items, 0);
        let stamped = store.last_refreshed().unwrap();
        assert_eq!(stamped, summary.completed_at);
        assert!(stamped >= before);
    }

    #[tokio::test]
    async fn discarded_outcomes_are_never_committed() {
        let store = Arc::new(MockStore::default());
        let mut aggregator = ResultAggregator::new(store.clone(), 2, RETENTION);

        aggregator.push(success(1, 1, 0));
        aggregator.push(failure(2));
        aggregator.push(success(3, 1, 0));
        assert_eq!(aggregator.held_batches(), 1);
        assert_eq!(aggregator.discard_pending(), 3, "full and partial batches are dropped");
        assert_eq!(aggregator.held_batches(), 0);

        aggregator.finalize().await.unwrap();
        assert!(store.commits().is_empty());
        assert_eq!(store.item_count(), 0);
    }

    #[tokio::test]
    async fn commit_failure_stops_later_batches() {
        let store = Arc::new(MockStore::failing_commit(1));
        let mut aggregator = ResultAggregator::new(store.clone(), 2, RETENTION);

        for id in 1..=5 {
            aggregator.push(success(id, 1, 0));
        }

        assert!(aggregator.finalize().await.is_err());
        assert_eq!(store.commits(), vec![2], "batches after the failed one are not attempted");
        assert_eq!(store.cleanup_calls(), 0);
        assert!(store.last_refreshed().is_none());
    }

    #[tokio::test]
    async fn cleanup_failure_fails_finalize() {
        let store = Arc::new(MockStore::failing_cleanup());
        let aggregator = ResultAggregator::new(store.clone(), 2, RETENTION);

        assert!(aggregator.finalize().await.is_err());
        assert!(store.last_refreshed().is_none());
    }
}
