//! Run controller: feed → articles → text → output.
//!
//! A run moves through these states, logging every transition:
//!
//! ```text
//! Fetching ─▶ Scraping ─┬─▶ Summarizing ──────┬─▶ Outputting ─▶ Done
//!                       └─▶ RawConcatenating ─┘
//! ```
//!
//! Any fatal error moves the run to `Failed` from wherever it was.
//! Summarizing is chosen when a [`Summarizer`] was configured; otherwise the
//! articles are concatenated as-is.

use crate::api::ModelCaller;
use crate::cancel::CancelToken;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::models::SourceResult;
use crate::outputs::text::TextSink;
use crate::outputs::voicevox::Synthesizer;
use crate::outputs::{OutputTarget, route_output};
use crate::scrapers::article::PageExtractor;
use crate::scrapers::rss::FeedResolver;
use crate::scrapers::{fetch_articles, successful, usable_links};
use crate::summarize::Summarizer;
use std::fmt;
use tracing::{debug, error, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Fetching,
    Scraping,
    Summarizing,
    RawConcatenating,
    Outputting,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Fetching => "fetching",
            RunState::Scraping => "scraping",
            RunState::Summarizing => "summarizing",
            RunState::RawConcatenating => "raw-concatenating",
            RunState::Outputting => "outputting",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a finished run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub feed_title: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub summarized: bool,
    pub output: OutputTarget,
}

/// Wires the collaborators of one run together.
///
/// - `R`: feed resolver
/// - `X`: article page extractor
/// - `M`: model caller behind the optional summarizer
/// - `S`: optional speech synthesizer
/// - `K`: text sink
pub struct Pipeline<R, X, M, S, K> {
    resolver: R,
    extractor: X,
    summarizer: Option<Summarizer<M>>,
    synthesizer: Option<S>,
    sink: K,
    config: PipelineConfig,
}

impl<R, X, M, S, K> Pipeline<R, X, M, S, K>
where
    R: FeedResolver,
    X: PageExtractor,
    M: ModelCaller,
    S: Synthesizer,
    K: TextSink,
{
    pub fn new(
        resolver: R,
        extractor: X,
        summarizer: Option<Summarizer<M>>,
        synthesizer: Option<S>,
        sink: K,
        config: PipelineConfig,
    ) -> Self {
        Self {
            resolver,
            extractor,
            summarizer,
            synthesizer,
            sink,
            config,
        }
    }

    /// Execute one run against `feed_url`.
    ///
    /// Resolves the feed, fetches every usable article, produces the text
    /// (summarized or concatenated) and hands it to the output router.
    ///
    /// # Arguments
    ///
    /// * `feed_url` - RSS or Atom feed to narrate
    /// * `cancel` - Run-wide cancellation; the deadline and Ctrl-C trip it
    ///
    /// # Returns
    ///
    /// A [`RunSummary`] once the output is written. The run fails on an
    /// unreadable or empty feed, when no article could be fetched, when a
    /// summarization stage fails, when output fails, or on cancellation.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let pipeline = Pipeline::new(resolver, extractor, summarizer, synthesizer, FsSink, config);
    /// let summary = pipeline.run("https://example.com/rss.xml", &CancelToken::new()).await?;
    /// ```
    #[instrument(level = "info", skip(self, cancel))]
    pub async fn run(&self, feed_url: &str, cancel: &CancelToken) -> Result<RunSummary> {
        let mut state = RunState::Fetching;
        info!(%state, "Run started");

        match self.drive(feed_url, cancel, &mut state).await {
            Ok(summary) => {
                advance(&mut state, RunState::Done);
                Ok(summary)
            }
            Err(e) => {
                error!(failed_in = %state, error = %e, "Run failed");
                advance(&mut state, RunState::Failed);
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        feed_url: &str,
        cancel: &CancelToken,
        state: &mut RunState,
    ) -> Result<RunSummary> {
        let feed = cancel.run(self.resolver.resolve(feed_url)).await??;
        let links = usable_links(feed.links)?;
        info!(feed_title = %feed.title, links = links.len(), "Feed resolved");

        advance(state, RunState::Scraping);
        let attempted = links.len();
        let results = fetch_articles(&self.extractor, links, self.config.parallel, cancel).await;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let sources = successful(results)?;
        let succeeded = sources.len();

        let text = match &self.summarizer {
            Some(summarizer) => {
                advance(state, RunState::Summarizing);
                summarizer.summarize(&feed.title, &sources, cancel).await?
            }
            None => {
                advance(state, RunState::RawConcatenating);
                raw_concatenation(&feed.title, &sources)
            }
        };

        advance(state, RunState::Outputting);
        let output = route_output(
            &text,
            &self.config,
            self.synthesizer.as_ref(),
            &self.sink,
            cancel,
        )
        .await?;

        Ok(RunSummary {
            feed_title: feed.title,
            attempted,
            succeeded,
            summarized: self.summarizer.is_some(),
            output,
        })
    }
}

fn advance(state: &mut RunState, next: RunState) {
    debug!(from = %state, to = %next, "State transition");
    *state = next;
}

/// The summarization-free output: every article under its own heading.
pub fn raw_concatenation(feed_title: &str, sources: &[SourceResult]) -> String {
    let mut out = format!("# {feed_title}\n\n");
    for source in sources {
        out.push_str(&format!(
            "## {}\n\n{}\n\n---\n\n",
            source.display_title(),
            source.content
        ));
    }
    out
}
