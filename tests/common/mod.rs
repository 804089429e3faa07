//! Common test utilities for feed-refresh integration tests

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

use feed_refresh::{Event, NotificationSink, NotificationUpdate};

/// Maximum time a whole refresh run may take in tests
pub const RUN_TIMEOUT: Duration = Duration::from_secs(10);

/// Build an RSS document with one item per `(path, age_days)` pair.
///
/// Items are published `age_days` days before now; links are rooted at
/// `base`. `links_missing` extra items are added without a link.
pub fn rss_feed(title: &str, base: &str, items: &[(&str, i64)], links_missing: usize) -> String {
    let mut body = String::new();
    for (path, age_days) in items {
        let published = (Utc::now() - ChronoDuration::days(*age_days)).to_rfc2822();
        body.push_str(&format!(
            "<item><title>{path}</title><link>{base}/{path}</link><pubDate>{published}</pubDate></item>\n"
        ));
    }
    for n in 0..links_missing {
        body.push_str(&format!("<item><title>orphan {n}</title></item>\n"));
    }

    format!(
        r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>{title}</title>
    <link>{base}</link>
    <description>{title} feed</description>
    {body}
  </channel>
</rss>"#
    )
}

/// Collect events until a terminal one (`Idle`, `Succeeded` or `Failed`) arrives
pub async fn collect_until_terminal(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let collect = async {
        let mut events = Vec::new();
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let terminal = matches!(
                        event,
                        Event::Idle | Event::Succeeded { .. } | Event::Failed { .. }
                    );
                    events.push(event);
                    if terminal {
                        return events;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return events,
            }
        }
    };

    tokio::time::timeout(RUN_TIMEOUT, collect)
        .await
        .unwrap_or_else(|_| panic!("refresh did not finish within {:?}", RUN_TIMEOUT))
}

/// Presentation sink that counts what it is asked to do
#[derive(Default)]
pub struct CountingSink {
    shown: AtomicUsize,
    dismissed: AtomicUsize,
}

impl CountingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn shown(&self) -> usize {
        self.shown.load(Ordering::SeqCst)
    }

    pub fn dismissed(&self) -> usize {
        self.dismissed.load(Ordering::SeqCst)
    }
}

impl NotificationSink for CountingSink {
    fn show(&self, _update: &NotificationUpdate) {
        self.shown.fetch_add(1, Ordering::SeqCst);
    }

    fn dismiss(&self) {
        self.dismissed.fetch_add(1, Ordering::SeqCst);
    }
}
