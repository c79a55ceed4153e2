//! Article page download and main-text extraction.
//!
//! Extraction is deliberately simple: paragraphs inside `<article>` win,
//! then paragraphs inside `<main>`, then every paragraph in the body. Each
//! paragraph has its whitespace collapsed and paragraphs are joined with a
//! blank line so the segmenter can break on them later.

use crate::error::FetchError;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, instrument};

/// Downloads one article URL and returns its readable text.
pub trait PageExtractor {
    async fn extract(&self, url: &str) -> Result<String, FetchError>;
}

impl<T: PageExtractor> PageExtractor for &T {
    async fn extract(&self, url: &str) -> Result<String, FetchError> {
        (**self).extract(url).await
    }
}

static ARTICLE_PARAGRAPHS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article p").expect("valid selector"));
static MAIN_PARAGRAPHS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("main p").expect("valid selector"));
static BODY_PARAGRAPHS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body p").expect("valid selector"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Extract readable text from an HTML document.
///
/// Returns an empty string when no paragraph carries any text.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);

    for selector in [&*ARTICLE_PARAGRAPHS, &*MAIN_PARAGRAPHS, &*BODY_PARAGRAPHS] {
        let paragraphs: Vec<String> = document
            .select(selector)
            .map(|p| collapse_whitespace(&p.text().collect::<String>()))
            .filter(|p| !p.is_empty())
            .collect();
        if !paragraphs.is_empty() {
            return paragraphs.join("\n\n");
        }
    }
    String::new()
}

fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

/// Fetches article pages over HTTP.
#[derive(Debug, Clone)]
pub struct HtmlExtractor {
    http: Client,
}

impl HtmlExtractor {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

impl PageExtractor for HtmlExtractor {
    #[instrument(level = "debug", skip(self))]
    async fn extract(&self, url: &str) -> Result<String, FetchError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let text = extract_text(&body);
        if text.is_empty() {
            return Err(FetchError::EmptyContent);
        }
        debug!(html_bytes = body.len(), text_chars = text.chars().count(), "Extracted article text");
        Ok(text)
    }
}
