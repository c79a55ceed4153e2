//! Feed resolution for RSS 0.9x/1.0/2.0 and Atom documents.
//!
//! Parsing is delegated to `feed-rs`, which understands every format and
//! keeps namespaced extensions (`media:*`, `dc:*`, `atom:*`) out of the core
//! item fields.

use crate::error::{Error, Result};
use crate::models::{ArticleLink, FeedInfo};
use feed_rs::model::{Entry, Link};
use feed_rs::parser;
use reqwest::Client;
use tracing::{debug, info, instrument};
use url::Url;

/// Turns a feed URL into its title and article links.
pub trait FeedResolver {
    async fn resolve(&self, feed_url: &str) -> Result<FeedInfo>;
}

impl<T: FeedResolver> FeedResolver for &T {
    async fn resolve(&self, feed_url: &str) -> Result<FeedInfo> {
        (**self).resolve(feed_url).await
    }
}

/// The `alternate` link, or a link without `rel`, or the first link.
fn primary_link(links: &[Link]) -> Option<&str> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .map(|l| l.href.as_str())
}

fn entry_link(entry: &Entry, base: Option<&Url>) -> ArticleLink {
    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.trim().to_string())
        .unwrap_or_default();
    let url = primary_link(&entry.links)
        .map(|href| absolutize(base, href.trim()))
        .unwrap_or_default();
    ArticleLink { url, title }
}

/// Parse a feed body.
///
/// Links are resolved against `feed_url` and the feed title falls back to
/// `feed_url` when the document has none. Every entry is returned as found,
/// including those with an empty link or title; filtering happens in
/// [`crate::scrapers::usable_links`].
///
/// # Errors
///
/// [`Error::Feed`] when the body is not an RSS or Atom document.
pub fn parse_feed(xml: &str, feed_url: &str) -> Result<FeedInfo> {
    let feed = parser::parse(xml.as_bytes()).map_err(|e| Error::Feed {
        url: feed_url.to_string(),
        reason: format!("not a valid RSS or Atom document: {e}"),
    })?;

    let base = Url::parse(feed_url).ok();
    let links = feed
        .entries
        .iter()
        .map(|entry| entry_link(entry, base.as_ref()))
        .collect();

    let title = feed
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| feed_url.to_string());

    Ok(FeedInfo { title, links })
}

fn absolutize(base: Option<&Url>, link: &str) -> String {
    if link.is_empty() {
        return String::new();
    }
    match base.map(|b| b.join(link)) {
        Some(Ok(resolved)) => resolved.to_string(),
        _ => link.to_string(),
    }
}

/// Resolves feeds over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFeedResolver {
    http: Client,
}

impl HttpFeedResolver {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

impl FeedResolver for HttpFeedResolver {
    #[instrument(level = "info", skip(self))]
    async fn resolve(&self, feed_url: &str) -> Result<FeedInfo> {
        let feed_error = |reason: String| Error::Feed {
            url: feed_url.to_string(),
            reason,
        };

        let resp = self
            .http
            .get(feed_url)
            .send()
            .await
            .map_err(|e| feed_error(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(feed_error(format!("HTTP {status}")));
        }
        let body = resp.text().await.map_err(|e| feed_error(e.to_string()))?;
        debug!(bytes = body.len(), "Downloaded feed document");

        let feed = parse_feed(&body, feed_url)?;
        info!(title = %feed.title, items = feed.links.len(), "Resolved feed");
        Ok(feed)
    }
}
