//! Top-level refresh state machine.
//!
//! [`FeedRefresher`] owns one run at a time. A run reads the source list,
//! fetches every source through a [`FetchWorkerPool`], applies each outcome on
//! a single control path (progress, persistence batching, notification), and
//! finalizes the store. Lifecycle [`Event`]s are published on a broadcast
//! channel; see [`FeedRefresher::subscribe`].
//!
//! ```text
//! Idle → Starting → Fetching → Finalizing → Done
//!                       ↘           ↘
//!                        Failed ←────┘
//! ```
//!
//! Both `Done` and `Failed` tear the run down and return the refresher to
//! `Idle`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::aggregator::ResultAggregator;
use crate::config::{Config, RefreshConfig};
use crate::error::{Error, ErrorKind, Result};
use crate::fetch::{FeedFetcher, FetchWorkerPool};
use crate::notifier::{NotificationSink, ThrottledNotifier};
use crate::progress::{Progress, ProgressTracker};
use crate::store::{FeedStore, SourceRegistry};
use crate::types::{Event, FetchOutcome, RefreshSummary, RunPhase};

/// Description shown while the store is being finalized
const FINALIZING_MESSAGE: &str = "processing";

/// How often a fetching run checks whether its event subscribers are still there
const SUBSCRIBER_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// How a run ended, before it is mapped onto a terminal phase
enum RunEnd {
    /// The registry returned no sources
    NothingToDo,
    /// Every source was applied and the store finalized
    Completed(RefreshSummary),
    /// Every event subscriber went away mid-run
    Abandoned,
}

/// Coordinates refresh runs and publishes their lifecycle
pub struct FeedRefresher {
    inner: Arc<RefresherInner>,
}

struct RefresherInner {
    config: RefreshConfig,
    retention: Duration,
    registry: Arc<dyn SourceRegistry>,
    pool: FetchWorkerPool,
    store: Arc<dyn FeedStore>,
    sink: Arc<dyn NotificationSink>,
    event_tx: broadcast::Sender<Event>,
    progress: Arc<ProgressTracker>,
    phase: Mutex<RunPhase>,
    /// Cancellation token of the active run
    active: Mutex<Option<CancellationToken>>,
}

/// Completion handle for one run
#[derive(Debug)]
pub struct RunHandle {
    rx: oneshot::Receiver<RunPhase>,
}

impl RunHandle {
    /// Wait for the run to finish and return its terminal phase
    /// ([`RunPhase::Done`] or [`RunPhase::Failed`]).
    ///
    /// By the time this returns the run has been torn down and the refresher
    /// accepts a new [`FeedRefresher::start`].
    pub async fn wait(self) -> RunPhase {
        self.rx.await.unwrap_or(RunPhase::Failed)
    }
}

impl FeedRefresher {
    /// Create a refresher from its collaborators.
    ///
    /// The configuration is validated up front.
    pub fn new(
        config: &Config,
        registry: Arc<dyn SourceRegistry>,
        fetcher: Arc<dyn FeedFetcher>,
        store: Arc<dyn FeedStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(config.refresh.event_buffer);
        let pool = FetchWorkerPool::new(fetcher, config.refresh.parallel_fetches);

        Ok(Self {
            inner: Arc::new(RefresherInner {
                config: config.refresh.clone(),
                retention: config.persistence.item_retention,
                registry,
                pool,
                store,
                sink,
                event_tx,
                progress: Arc::new(ProgressTracker::new()),
                phase: Mutex::new(RunPhase::Idle),
                active: Mutex::new(None),
            }),
        })
    }

    /// Subscribe to lifecycle events.
    ///
    /// If a run starts with at least one subscriber and every subscriber is
    /// dropped before it finishes, the run is cancelled without publishing a
    /// terminal event.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.event_tx.subscribe()
    }

    /// Start a run in the background.
    ///
    /// Fails with [`Error::AlreadyRunning`] unless the refresher is idle; the
    /// active run is left untouched. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<RunHandle> {
        let cancel_token = CancellationToken::new();
        {
            let mut phase = lock(&self.inner.phase);
            if *phase != RunPhase::Idle {
                tracing::debug!(phase = %phase, "Refresh requested while a run is active");
                return Err(Error::AlreadyRunning);
            }
            *phase = RunPhase::Starting;
            // Set before the phase lock is released
            *lock(&self.inner.active) = Some(cancel_token.clone());
        }

        let had_subscribers = self.inner.event_tx.receiver_count() > 0;

        let (done_tx, done_rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let phase = inner.run(cancel_token, had_subscribers).await;
            done_tx.send(phase).ok();
        });

        Ok(RunHandle { rx: done_rx })
    }

    /// Current phase of the state machine
    pub fn phase(&self) -> RunPhase {
        *lock(&self.inner.phase)
    }

    /// Current progress counters
    pub fn progress(&self) -> Progress {
        self.inner.progress.snapshot()
    }

    /// Abort the active run, if any.
    ///
    /// Dispatch stops, in-flight fetches are asked to abort, buffered results
    /// are dropped, and [`Event::Failed`] carrying [`Error::Cancelled`] is
    /// published. A run that is already finalizing completes normally.
    /// Returns whether a run was active.
    pub fn cancel(&self) -> bool {
        match lock(&self.inner.active).as_ref() {
            Some(token) => {
                tracing::info!("Cancelling refresh run");
                token.cancel();
                true
            }
            None => false,
        }
    }
}

impl RefresherInner {
    async fn run(&self, cancel_token: CancellationToken, had_subscribers: bool) -> RunPhase {
        let notifier = ThrottledNotifier::spawn(
            self.config.notification_sampling_period,
            Arc::clone(&self.sink),
            Arc::clone(&self.progress),
            cancel_token.child_token(),
        );

        let result = self
            .execute(&cancel_token, &notifier, had_subscribers)
            .await;

        let terminal = match result {
            Ok(RunEnd::NothingToDo) => {
                self.set_phase(RunPhase::Done);
                tracing::info!("No subscriptions to refresh");
                self.publish(Event::Idle);
                RunPhase::Done
            }
            Ok(RunEnd::Completed(summary)) => {
                self.set_phase(RunPhase::Done);
                tracing::info!(
                    soft_errors = summary.errors.len(),
                    removed_items = summary.removed_items,
                    "Refresh complete"
                );
                self.publish(Event::Succeeded {
                    errors: Arc::new(summary.errors),
                });
                RunPhase::Done
            }
            Ok(RunEnd::Abandoned) => {
                self.set_phase(RunPhase::Failed);
                tracing::info!("All event subscribers gone, refresh abandoned");
                RunPhase::Failed
            }
            Err(e) => {
                self.set_phase(RunPhase::Failed);
                tracing::error!(error = %e, "Refresh failed");
                self.publish(Event::Failed { error: Arc::new(e) });
                RunPhase::Failed
            }
        };

        // Teardown
        cancel_token.cancel();
        notifier.shutdown().await;
        self.sink.dismiss();
        *lock(&self.active) = None;
        self.set_phase(RunPhase::Idle);

        terminal
    }

    async fn execute(
        &self,
        cancel_token: &CancellationToken,
        notifier: &ThrottledNotifier,
        had_subscribers: bool,
    ) -> Result<RunEnd> {
        let sources = self.registry.list_sources().await?;
        if cancel_token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.progress.reset(sources.len());
        if sources.is_empty() {
            return Ok(RunEnd::NothingToDo);
        }

        tracing::info!(
            sources = sources.len(),
            workers = self.pool.workers(),
            "Starting feed refresh"
        );
        self.set_phase(RunPhase::Fetching);

        let mut aggregator = ResultAggregator::new(
            Arc::clone(&self.store),
            self.config.batch_size,
            self.retention,
        );

        let (tx, mut rx) = mpsc::channel(self.pool.workers());
        let fetch_token = cancel_token.child_token();
        let pool = self.pool.clone();
        let pool_token = fetch_token.clone();
        let pool_task = tokio::spawn(async move { pool.run(sources, tx, pool_token).await });

        let mut subscriber_check = tokio::time::interval(SUBSCRIBER_CHECK_INTERVAL);
        subscriber_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let subscribers_gone = || had_subscribers && self.event_tx.receiver_count() == 0;

        let fetched = loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => break Err(Error::Cancelled),

                outcome = rx.recv() => {
                    let Some(outcome) = outcome else {
                        break Ok(true);
                    };
                    if let Err(e) = self.apply(outcome, &mut aggregator, notifier) {
                        break Err(e);
                    }
                    if subscribers_gone() {
                        break Ok(false);
                    }
                }

                // Covers stretches where no outcome arrives
                _ = subscriber_check.tick(), if had_subscribers => {
                    if subscribers_gone() {
                        break Ok(false);
                    }
                }
            }
        };

        if !matches!(fetched, Ok(true)) {
            fetch_token.cancel();
            let dropped = aggregator.discard_pending();
            tracing::debug!(dropped, "Discarded pending outcomes");
        }
        drop(rx);
        if let Err(e) = pool_task.await {
            tracing::error!(error = %e, "Fetch pool task panicked");
        }

        if !fetched? {
            return Ok(RunEnd::Abandoned);
        }

        self.set_phase(RunPhase::Finalizing);
        let progress = self.progress.set_indeterminate();
        self.publish(Event::ProgressUpdated {
            current: progress.current,
            total: progress.total,
        });
        self.publish(Event::PhaseMessage {
            message: FINALIZING_MESSAGE.to_string(),
        });
        notifier.notify(FINALIZING_MESSAGE);

        let summary = aggregator.finalize().await?;
        Ok(RunEnd::Completed(summary))
    }

    /// Apply one outcome on the control path.
    ///
    /// A fatal failure is returned as the run's error before anything is
    /// counted or buffered.
    fn apply(
        &self,
        outcome: FetchOutcome,
        aggregator: &mut ResultAggregator,
        notifier: &ThrottledNotifier,
    ) -> Result<()> {
        let outcome = match outcome {
            FetchOutcome::Failure(err) if err.kind() == ErrorKind::Fatal => {
                tracing::error!(request = %err.request, error = %err.cause, "Fatal fetch error, aborting run");
                return Err(Error::Fetch(err));
            }
            other => other,
        };

        let progress = self.progress.increment();
        let description = outcome.description().to_string();
        tracing::debug!(
            source_id = %outcome.source_id(),
            current = progress.current,
            total = progress.total,
            "Applied fetch outcome"
        );

        aggregator.push(outcome);

        self.publish(Event::ProgressUpdated {
            current: progress.current,
            total: progress.total,
        });
        notifier.notify(description);
        Ok(())
    }

    fn set_phase(&self, phase: RunPhase) {
        *lock(&self.phase) = phase;
    }

    fn publish(&self, event: Event) {
        // Send only fails when nobody is subscribed
        self.event_tx.send(event).ok();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
