//! Feed resolution and concurrent article fetching.
//!
//! A run goes through two phases here:
//!
//! 1. **Indexing**: [`rss`] turns the feed URL into a list of article links,
//!    and [`usable_links`] drops the ones that cannot be processed
//! 2. **Fetching**: [`fetch_articles`] downloads every link through a
//!    [`PageExtractor`](article::PageExtractor) with bounded concurrency
//!
//! Per-article failures are logged and recorded on the
//! [`SourceResult`], never propagated. Only a run where every article failed
//! is an error, raised by [`successful`].

pub mod article;
pub mod rss;

use crate::cancel::CancelToken;
use crate::error::{Error, FetchError, Result};
use crate::models::{ArticleLink, SourceResult};
use article::PageExtractor;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use tracing::{debug, info, instrument, warn};

/// Keep links that have both a URL and a title, first occurrence of each URL
/// wins. An empty result is [`Error::EmptyFeed`].
pub fn usable_links(links: Vec<ArticleLink>) -> Result<Vec<ArticleLink>> {
    let total = links.len();
    let usable: Vec<ArticleLink> = links
        .into_iter()
        .filter(|l| !l.url.trim().is_empty() && !l.title.trim().is_empty())
        .unique_by(|l| l.url.clone())
        .collect();

    if usable.is_empty() {
        return Err(Error::EmptyFeed);
    }
    if usable.len() < total {
        debug!(total, usable = usable.len(), "Dropped feed items without link or title, or duplicates");
    }
    Ok(usable)
}

/// Fetch every link with at most `parallel` requests in flight.
///
/// # Arguments
///
/// * `extractor` - Downloads a page and returns its article text
/// * `links` - Usable links from [`usable_links`]
/// * `parallel` - Concurrency bound; zero is treated as one
/// * `cancel` - Aborts fetches that are still running
///
/// # Returns
///
/// Exactly one [`SourceResult`] per link, in completion order. Failures are
/// recorded on the result and logged, never returned. Once `cancel` trips,
/// every running or queued fetch resolves to [`FetchError::Cancelled`].
///
/// # Example
///
/// ```ignore
/// let results = fetch_articles(&HtmlExtractor::new(http), links, 10, &cancel).await;
/// let sources = successful(results)?;
/// ```
#[instrument(level = "info", skip_all, fields(links = links.len(), parallel = parallel))]
pub async fn fetch_articles<X: PageExtractor>(
    extractor: &X,
    links: Vec<ArticleLink>,
    parallel: usize,
    cancel: &CancelToken,
) -> Vec<SourceResult> {
    let results: Vec<SourceResult> = stream::iter(links)
        .map(|link| async move {
            let outcome = match cancel.run(extractor.extract(&link.url)).await {
                Ok(Ok(text)) if text.trim().is_empty() => Err(FetchError::EmptyContent),
                Ok(outcome) => outcome,
                Err(_) => Err(FetchError::Cancelled),
            };
            match outcome {
                Ok(text) => {
                    debug!(url = %link.url, chars = text.chars().count(), "Fetched article");
                    SourceResult::success(link, text)
                }
                Err(e) => {
                    warn!(url = %link.url, error = %e, "Article fetch failed");
                    SourceResult::failure(link, e)
                }
            }
        })
        .buffer_unordered(parallel.max(1))
        .collect()
        .await;

    let succeeded = results.iter().filter(|r| r.is_success()).count();
    info!(succeeded, failed = results.len() - succeeded, "Fetched article contents");
    results
}

/// Keep the successful results; an all-failure batch is
/// [`Error::AllFetchesFailed`].
pub fn successful(results: Vec<SourceResult>) -> Result<Vec<SourceResult>> {
    let attempted = results.len();
    let ok: Vec<SourceResult> = results.into_iter().filter(SourceResult::is_success).collect();
    if ok.is_empty() {
        return Err(Error::AllFetchesFailed { attempted });
    }
    Ok(ok)
}
