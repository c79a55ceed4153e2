//! Data models that flow through one pipeline run.
//!
//! - [`FeedInfo`] / [`ArticleLink`]: what the feed resolver hands back
//! - [`SourceResult`]: the fetch/extract outcome for one article URL
//! - [`Segment`]: a bounded slice of the combined article text
//! - [`SegmentSummary`]: the map-phase output for one segment
//!
//! None of these outlive a single run.

use crate::error::FetchError;

/// A link discovered in a feed, with the title the feed gave it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleLink {
    pub url: String,
    pub title: String,
}

/// A resolved feed: its own title plus the links it lists, in feed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedInfo {
    pub title: String,
    pub links: Vec<ArticleLink>,
}

/// Outcome of fetching and extracting one article.
///
/// Exactly one is produced per input link. `content` is empty whenever
/// `error` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceResult {
    pub url: String,
    pub title: String,
    pub content: String,
    pub error: Option<FetchError>,
}

impl SourceResult {
    pub fn success(link: ArticleLink, content: String) -> Self {
        Self {
            url: link.url,
            title: link.title,
            content,
            error: None,
        }
    }

    pub fn failure(link: ArticleLink, error: FetchError) -> Self {
        Self {
            url: link.url,
            title: link.title,
            content: String::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The title to show for this article; the URL stands in when the
    /// title is blank.
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.url
        } else {
            &self.title
        }
    }
}

/// A contiguous slice of the combined text.
///
/// `position` is the 0-based creation order assigned by the segmenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub position: usize,
    pub text: String,
}

/// Successful map-phase output for the segment at `position`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSummary {
    pub position: usize,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(url: &str, title: &str) -> ArticleLink {
        ArticleLink {
            url: url.to_string(),
            title: title.to_string(),
        }
    }

    #[test]
    fn test_failure_has_no_content() {
        let res = SourceResult::failure(link("https://a.test/1", "One"), FetchError::EmptyContent);
        assert!(!res.is_success());
        assert!(res.content.is_empty());
        assert_eq!(res.error, Some(FetchError::EmptyContent));
    }

    #[test]
    fn test_display_title_falls_back_to_url() {
        let res = SourceResult::success(link("https://a.test/1", "  "), "body".to_string());
        assert_eq!(res.display_title(), "https://a.test/1");

        let res = SourceResult::success(link("https://a.test/2", "Two"), "body".to_string());
        assert_eq!(res.display_title(), "Two");
    }
}
