//! Rate-limited progress descriptions for the presentation layer.
//!
//! [`Throttle`] is the flow-control rule as a plain state machine: the first
//! description goes out immediately, later ones are coalesced so that at most
//! one is emitted per sampling window and the most recent one wins.
//! [`ThrottledNotifier`] drives a `Throttle` from a tokio task and forwards
//! emissions to a [`NotificationSink`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::progress::{Progress, ProgressTracker};

/// Latest-wins throttle with guaranteed first emission
#[derive(Debug)]
pub struct Throttle {
    period: Duration,
    window_end: Option<Instant>,
    pending: Option<String>,
}

impl Throttle {
    /// Create a throttle that emits at most once per `period`
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            window_end: None,
            pending: None,
        }
    }

    /// Offer a description received at `now`.
    ///
    /// Returns the description to emit right away, if any. Otherwise it is
    /// held until [`Throttle::deadline`], replacing any earlier held value.
    pub fn offer(&mut self, now: Instant, description: String) -> Option<String> {
        if let Some(end) = self.window_end
            && now < end
        {
            self.pending = Some(description);
            return None;
        }

        self.pending = None;
        self.window_end = Some(now + self.period);
        Some(description)
    }

    /// When the held description is due, if one is held
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().and(self.window_end)
    }

    /// Close the window if it has elapsed at `now`, returning the held description
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        let end = self.window_end?;
        if now < end {
            return None;
        }

        match self.pending.take() {
            Some(description) => {
                self.window_end = Some(now + self.period);
                Some(description)
            }
            None => {
                self.window_end = None;
                None
            }
        }
    }
}

/// What the presentation layer is asked to display
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationUpdate {
    /// Latest description (may be empty)
    pub description: String,
    /// Progress counters at emission time
    pub progress: Progress,
}

impl NotificationUpdate {
    /// Text combining the description and counters
    pub fn content_text(&self) -> String {
        format_content_text(&self.description, self.progress)
    }
}

/// Combine a description with the progress counters for display.
///
/// Determinate progress renders as `"<description>  (<current>/<total>)"`, or
/// just the counters when the description is empty. Indeterminate progress
/// renders the bare description.
pub fn format_content_text(description: &str, progress: Progress) -> String {
    if progress.is_indeterminate() {
        return description.to_string();
    }

    let progress_text = format!("{}/{}", progress.current, progress.total);
    if description.is_empty() {
        progress_text
    } else {
        format!("{}  ({})", description, progress_text)
    }
}

/// Presentation collaborator that displays run progress
pub trait NotificationSink: Send + Sync {
    /// Display an update
    fn show(&self, update: &NotificationUpdate);

    /// Remove the display; the run has reached a terminal state
    fn dismiss(&self);
}

/// [`NotificationSink`] that writes updates to the `tracing` log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn show(&self, update: &NotificationUpdate) {
        tracing::info!(
            current = update.progress.current,
            total = update.progress.total,
            "{}",
            update.content_text()
        );
    }

    fn dismiss(&self) {
        tracing::debug!("Refresh notification dismissed");
    }
}

/// Throttled forwarding of descriptions to a [`NotificationSink`]
pub struct ThrottledNotifier {
    tx: mpsc::UnboundedSender<String>,
    cancel_token: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl ThrottledNotifier {
    /// Spawn the driver task.
    ///
    /// Counters are read from `progress` at emission time. The task stops
    /// emitting once `cancel_token` is cancelled.
    pub fn spawn(
        period: Duration,
        sink: Arc<dyn NotificationSink>,
        progress: Arc<ProgressTracker>,
        cancel_token: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_throttle(
            Throttle::new(period),
            rx,
            sink,
            progress,
            cancel_token.clone(),
        ));

        Self {
            tx,
            cancel_token,
            task,
        }
    }

    /// Queue a description for display
    pub fn notify(&self, description: impl Into<String>) {
        // Send only fails once the driver has stopped
        let _ = self.tx.send(description.into());
    }

    /// Stop the driver and wait for it to exit. Held descriptions are dropped.
    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        drop(self.tx);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Notification task panicked");
        }
    }
}

async fn run_throttle(
    mut throttle: Throttle,
    mut rx: mpsc::UnboundedReceiver<String>,
    sink: Arc<dyn NotificationSink>,
    progress: Arc<ProgressTracker>,
    cancel_token: CancellationToken,
) {
    let emit = |description: String| {
        sink.show(&NotificationUpdate {
            description,
            progress: progress.snapshot(),
        });
    };

    loop {
        let deadline = throttle.deadline();
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            msg = rx.recv() => {
                let Some(description) = msg else {
                    break;
                };
                let now = tokio::time::Instant::now().into_std();
                if let Some(out) = throttle.offer(now, description) {
                    emit(out);
                }
            }
            _ = sleep_until_deadline(deadline), if deadline.is_some() => {
                let now = tokio::time::Instant::now().into_std();
                if let Some(out) = throttle.poll(now) {
                    emit(out);
                }
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}
