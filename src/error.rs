//! Error kinds for the narration pipeline.
//!
//! Two layers exist:
//! - [`FetchError`]: per-URL and recoverable. It is recorded on the
//!   article's [`SourceResult`](crate::models::SourceResult) and never aborts
//!   the run by itself.
//! - [`Error`]: everything else. These surface to the caller, wrapped with
//!   the stage they came from via [`Error::Stage`].

use std::fmt;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a single article could not be turned into text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("no article body could be extracted")]
    EmptyContent,

    #[error("cancelled before the article was fetched")]
    Cancelled,
}

/// One failed segment of the map phase, tagged with its 1-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFailure {
    pub position: usize,
    pub message: String,
    /// The segment was stopped by run cancellation, not by its model call.
    pub cancelled: bool,
}

impl fmt::Display for SegmentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment {}: {}", self.position, self.message)
    }
}

/// Named stages of the summarization chain, used to label wrapped errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageName {
    Map,
    Reduce,
    FinalSummary,
    Script,
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageName::Map => "map",
            StageName::Reduce => "reduce",
            StageName::FinalSummary => "final-summary",
            StageName::Script => "script",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to resolve feed {url}: {reason}")]
    Feed { url: String, reason: String },

    #[error("feed contained no article with both a link and a title")]
    EmptyFeed,

    #[error("none of the {attempted} articles could be extracted")]
    AllFetchesFailed { attempted: usize },

    #[error("{template} prompt: required field `{field}` is empty")]
    PromptBuild {
        template: &'static str,
        field: &'static str,
    },

    #[error("model call to `{model}` failed: {reason}")]
    ModelCall { model: String, reason: String },

    #[error("{} of the map segments failed:\n- {}", .0.len(), join_failures(.0))]
    SegmentAggregation(Vec<SegmentFailure>),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: StageName,
        #[source]
        source: Box<Error>,
    },

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("failed to write output to {destination}: {source}")]
    SinkWrite {
        destination: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("run cancelled")]
    Cancelled,
}

impl Error {
    /// Wrap `self` with the name of the stage it escaped from.
    pub fn in_stage(self, stage: StageName) -> Self {
        Error::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// True when the error, or anything it wraps, is a cancellation. A map
    /// aggregation counts when any of its segments was cancelled.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::Stage { source, .. } => source.is_cancelled(),
            Error::SegmentAggregation(failures) => failures.iter().any(|f| f.cancelled),
            _ => false,
        }
    }
}

fn join_failures(failures: &[SegmentFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n- ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_aggregation_lists_every_position() {
        let err = Error::SegmentAggregation(vec![
            SegmentFailure {
                position: 2,
                message: "timeout".to_string(),
                cancelled: false,
            },
            SegmentFailure {
                position: 5,
                message: "bad gateway".to_string(),
                cancelled: false,
            },
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("2 of the map segments failed"));
        assert!(msg.contains("- segment 2: timeout"));
        assert!(msg.contains("- segment 5: bad gateway"));
    }

    #[test]
    fn test_stage_wrapping_keeps_source() {
        let err = Error::PromptBuild {
            template: "reduce",
            field: "combined_text",
        }
        .in_stage(StageName::Reduce);
        assert_eq!(
            err.to_string(),
            "reduce stage failed: reduce prompt: required field `combined_text` is empty"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_is_cancelled_sees_through_stage() {
        assert!(Error::Cancelled.in_stage(StageName::Map).is_cancelled());
        assert!(!Error::EmptyFeed.is_cancelled());
    }

    #[test]
    fn test_aggregation_with_cancelled_segment_is_cancelled() {
        let failure = |position, cancelled| SegmentFailure {
            position,
            message: "x".to_string(),
            cancelled,
        };
        assert!(!Error::SegmentAggregation(vec![failure(1, false)]).is_cancelled());
        assert!(
            Error::SegmentAggregation(vec![failure(1, false), failure(2, true)])
                .in_stage(StageName::Map)
                .is_cancelled()
        );
    }
}
