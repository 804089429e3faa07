//! RSS/Atom fetch client over HTTP.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::HttpConfig;
use crate::error::FetchError;
use crate::types::{FeedItem, FetchedInfo, Source};

use super::FeedFetcher;

/// [`FeedFetcher`] that downloads a source URL and parses it as RSS, falling
/// back to Atom.
///
/// HTTP 429 is reported as a verification challenge so the run backs off
/// instead of hammering a rate-limited service.
pub struct HttpFeedFetcher {
    http_client: reqwest::Client,
}

impl HttpFeedFetcher {
    /// Create a fetcher from HTTP settings
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &HttpConfig) -> crate::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| crate::Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }

    async fn download(&self, url: &str) -> Result<String, FetchError> {
        let response = self.http_client.get(url).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::Challenge(format!("rate limited by {}", url)));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                code: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(
        &self,
        source: &Source,
        cancel_token: &CancellationToken,
    ) -> Result<FetchedInfo, FetchError> {
        url::Url::parse(&source.url)
            .map_err(|e| FetchError::Other(format!("invalid source URL {}: {}", source.url, e)))?;

        let content = tokio::select! {
            _ = cancel_token.cancelled() => return Err(FetchError::Cancelled),
            content = self.download(&source.url) => content?,
        };

        match parse_as_rss(&content) {
            Ok(info) => {
                tracing::debug!(url = %source.url, items = info.items.len(), "Parsed as RSS");
                Ok(info)
            }
            Err(rss_err) => match parse_as_atom(&content) {
                Ok(info) => {
                    tracing::debug!(url = %source.url, items = info.items.len(), "Parsed as Atom");
                    Ok(info)
                }
                Err(atom_err) => Err(FetchError::Parse(format!(
                    "not RSS ({}) or Atom ({})",
                    rss_err, atom_err
                ))),
            },
        }
    }
}

/// Parse feed content as RSS 2.0
pub(crate) fn parse_as_rss(content: &str) -> Result<FetchedInfo, FetchError> {
    let channel = content
        .parse::<rss::Channel>()
        .map_err(|e| FetchError::Parse(e.to_string()))?;

    let mut info = FetchedInfo {
        name: channel.title().to_string(),
        avatar_url: channel.image().map(|img| img.url().to_string()),
        description: Some(channel.description().to_string()).filter(|d| !d.is_empty()),
        ..FetchedInfo::default()
    };

    for (index, item) in channel.items().iter().enumerate() {
        // Prefer the link; permalink GUIDs are URLs too
        let url = item.link().map(str::to_string).or_else(|| {
            item.guid()
                .filter(|g| g.is_permalink())
                .map(|g| g.value().to_string())
        });

        let Some(url) = url else {
            info.errors.push(FetchError::Parse(format!(
                "item {} ({}) has no link",
                index,
                item.title().unwrap_or("untitled")
            )));
            continue;
        };

        let published_at = item.pub_date().and_then(|date| {
            DateTime::parse_from_rfc2822(date)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        });

        info.items.push(FeedItem {
            url,
            title: item.title().unwrap_or("").to_string(),
            uploader: item
                .author()
                .map(str::to_string)
                .or_else(|| item.dublin_core_ext().and_then(|dc| dc.creators().first().cloned())),
            published_at,
        });
    }

    Ok(info)
}

/// Parse feed content as Atom
pub(crate) fn parse_as_atom(content: &str) -> Result<FetchedInfo, FetchError> {
    let feed = atom_syndication::Feed::read_from(content.as_bytes())
        .map_err(|e| FetchError::Parse(e.to_string()))?;

    let mut info = FetchedInfo {
        name: feed.title().as_str().to_string(),
        avatar_url: feed
            .icon()
            .or_else(|| feed.logo())
            .map(str::to_string),
        description: feed.subtitle().map(|s| s.as_str().to_string()),
        ..FetchedInfo::default()
    };

    for entry in feed.entries() {
        let link = entry
            .links()
            .iter()
            .find(|link| link.rel() == "alternate")
            .or_else(|| entry.links().first());

        let Some(link) = link else {
            info.errors.push(FetchError::Parse(format!(
                "entry {} has no link",
                entry.id()
            )));
            continue;
        };

        let published_at = entry
            .published()
            .unwrap_or_else(|| entry.updated())
            .with_timezone(&Utc);

        info.items.push(FeedItem {
            url: link.href().to_string(),
            title: entry.title().as_str().to_string(),
            uploader: entry
                .authors()
                .first()
                .or_else(|| feed.authors().first())
                .map(|p| p.name().to_string()),
            published_at: Some(published_at),
        });
    }

    Ok(info)
}
