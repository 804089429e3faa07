//! Bounded-parallel fetching of subscribed sources.
//!
//! [`FetchWorkerPool`] runs one [`FeedFetcher::fetch`] per source with at most
//! `workers` in flight and reports exactly one [`FetchOutcome`] per dispatched
//! source, in completion order.

mod http;

pub use http::HttpFeedFetcher;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, RequestError};
use crate::types::{FetchOutcome, FetchedInfo, Source};

/// Single-source fetch client
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch the latest information for `source`.
    ///
    /// Implementations should return promptly with [`FetchError::Cancelled`]
    /// once `cancel_token` is cancelled.
    async fn fetch(
        &self,
        source: &Source,
        cancel_token: &CancellationToken,
    ) -> std::result::Result<FetchedInfo, FetchError>;
}

/// Runs fetches for a list of sources with bounded parallelism
#[derive(Clone)]
pub struct FetchWorkerPool {
    fetcher: Arc<dyn FeedFetcher>,
    workers: usize,
}

impl FetchWorkerPool {
    /// Create a pool running at most `workers` fetches at once
    pub fn new(fetcher: Arc<dyn FeedFetcher>, workers: usize) -> Self {
        Self {
            fetcher,
            workers: workers.max(1),
        }
    }

    /// Number of fetches allowed in flight
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Fetch every source, sending each outcome to `tx` as it completes.
    ///
    /// Once `cancel_token` is cancelled no further sources are dispatched;
    /// fetches already in flight finish (or abort, per the fetch client) and
    /// their outcomes are still sent. Returns when every dispatched fetch has
    /// reported or the receiver has gone away.
    pub async fn run(
        &self,
        sources: Vec<Source>,
        tx: mpsc::Sender<FetchOutcome>,
        cancel_token: CancellationToken,
    ) {
        let dispatch_token = cancel_token.clone();
        let mut outcomes = stream::iter(sources)
            .take_while(move |_| futures::future::ready(!dispatch_token.is_cancelled()))
            .map(|source| {
                let fetcher = Arc::clone(&self.fetcher);
                let cancel_token = cancel_token.clone();
                async move {
                    let task_source = source.clone();
                    let handle = tokio::spawn(async move {
                        fetch_one(fetcher.as_ref(), &task_source, &cancel_token).await
                    });
                    match handle.await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            tracing::error!(source_id = %source.id, error = %e, "Fetch task panicked");
                            FetchOutcome::Failure(RequestError::new(
                                &source,
                                FetchError::Other(format!("fetch task failed: {}", e)),
                            ))
                        }
                    }
                }
            })
            .buffer_unordered(self.workers);

        while let Some(outcome) = outcomes.next().await {
            if tx.send(outcome).await.is_err() {
                tracing::debug!("Outcome receiver dropped, stopping fetch pool");
                break;
            }
        }
    }
}

/// Fetch one source, wrapping any failure with the source's provenance
async fn fetch_one(
    fetcher: &dyn FeedFetcher,
    source: &Source,
    cancel_token: &CancellationToken,
) -> FetchOutcome {
    tracing::debug!(source_id = %source.id, url = %source.url, "Fetching source");

    match fetcher.fetch(source, cancel_token).await {
        Ok(info) => FetchOutcome::Success {
            source_id: source.id,
            info,
        },
        Err(e) => {
            tracing::debug!(source_id = %source.id, error = %e, "Source fetch failed");
            FetchOutcome::Failure(RequestError::new(source, e))
        }
    }
}
