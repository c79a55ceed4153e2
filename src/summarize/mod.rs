//! The four-stage summarization chain.
//!
//! ```text
//! sources ─combine─▶ text ─segment─▶ [seg…] ─map─▶ [summary…] ─reduce─▶ intermediate
//!        ─final summary─▶ summary ─script─▶ narration script
//! ```
//!
//! The map stage is the only concurrent one (see [`map`]); the remaining
//! stages run one after another (see [`stages`]). Every model call goes
//! through the shared [`RateLimiter`], and every await is raced against the
//! run's [`CancelToken`].

pub mod map;
pub mod stages;

use crate::api::ModelCaller;
use crate::cancel::CancelToken;
use crate::config::{PipelineConfig, StageModels};
use crate::error::{Result, StageName};
use crate::limiter::RateLimiter;
use crate::models::SourceResult;
use crate::segmenter::{DOCUMENT_SEPARATOR, Segmenter};
use std::time::Instant;
use tracing::{info, instrument};

/// Runs the summarization chain against one [`ModelCaller`].
#[derive(Debug)]
pub struct Summarizer<M> {
    model: M,
    models: StageModels,
    limiter: RateLimiter,
    segmenter: Segmenter,
}

impl<M: ModelCaller> Summarizer<M> {
    pub fn new(model: M, config: &PipelineConfig) -> Self {
        Self {
            model,
            models: config.models.clone(),
            limiter: RateLimiter::new(config.rate_limit),
            segmenter: Segmenter::new(config.max_segment_chars, config.verbose),
        }
    }

    /// Turn the successful articles into a narration script.
    ///
    /// Runs combine, segment, map, reduce, final summary and script in that
    /// order. Each model call waits on the shared rate limiter first.
    ///
    /// # Arguments
    ///
    /// * `feed_title` - Stands in for the title when the reduce output has
    ///   no level-1 heading
    /// * `sources` - Fetched articles; failed ones are skipped
    /// * `cancel` - Aborts the waits and model calls in flight
    ///
    /// # Returns
    ///
    /// The script text, or the first failing stage's error wrapped in
    /// [`Error::Stage`](crate::error::Error::Stage).
    #[instrument(level = "info", skip_all, fields(sources = sources.len()))]
    pub async fn summarize(
        &self,
        feed_title: &str,
        sources: &[SourceResult],
        cancel: &CancelToken,
    ) -> Result<String> {
        let t0 = Instant::now();
        let combined = combine_contents(sources);
        let segments = self.segmenter.segment(&combined);
        info!(
            combined_chars = combined.chars().count(),
            segments = segments.len(),
            max_segment_chars = self.segmenter.max_chars(),
            "Segmented combined article text"
        );

        let summaries = self
            .map_segments(&segments, cancel)
            .await
            .map_err(|e| e.in_stage(StageName::Map))?;
        let intermediate = self.reduce(&summaries, cancel).await?;
        let title = stages::resolve_title(&intermediate, feed_title);
        let summary = self.final_summary(&title, &intermediate, cancel).await?;
        let script = self.script(&title, &summary, cancel).await?;

        info!(
            elapsed_ms = t0.elapsed().as_millis(),
            script_chars = script.chars().count(),
            "Summarization chain complete"
        );
        Ok(script)
    }

    /// One rate-limited, cancellable model call.
    async fn call(&self, prompt: &str, model: &str, cancel: &CancelToken) -> Result<String> {
        self.limiter.acquire_or_cancel(cancel).await?;
        cancel.run(self.model.generate(prompt, model)).await?
    }
}

/// Concatenate successful articles into one annotated text.
///
/// Each document gets a header block with its 1-based index, title and URL.
/// [`DOCUMENT_SEPARATOR`] sits between documents, not after the last one.
pub fn combine_contents(sources: &[SourceResult]) -> String {
    sources
        .iter()
        .filter(|s| s.is_success() && !s.content.is_empty())
        .enumerate()
        .map(|(i, s)| {
            format!(
                "--- SOURCE DOCUMENT {} ---\nTITLE: {}\nURL: {}\n\n{}",
                i + 1,
                s.display_title(),
                s.url,
                s.content
            )
        })
        .collect::<Vec<_>>()
        .join(DOCUMENT_SEPARATOR)
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::api::ModelCaller;
    use crate::error::{Error, Result};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted model: picks a reply by prompt content and records calls.
    pub struct ScriptedModel {
        pub calls: Mutex<Vec<(String, String)>>,
        pub reply: fn(&str, &str) -> Result<(String, Duration)>,
    }

    impl ScriptedModel {
        pub fn new(reply: fn(&str, &str) -> Result<(String, Duration)>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                reply,
            }
        }

        pub fn models_called(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(_, m)| m.clone())
                .collect()
        }
    }

    impl ModelCaller for ScriptedModel {
        async fn generate(&self, prompt: &str, model: &str) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((prompt.to_string(), model.to_string()));
            let (text, delay) = (self.reply)(prompt, model)?;
            tokio::time::sleep(delay).await;
            Ok(text)
        }
    }

    pub fn model_error(model: &str, reason: &str) -> Error {
        Error::ModelCall {
            model: model.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{ScriptedModel, model_error};
    use super::*;
    use crate::error::Error;
    use crate::models::ArticleLink;
    use std::time::Duration;

    fn source(url: &str, title: &str, content: &str) -> SourceResult {
        SourceResult::success(
            ArticleLink {
                url: url.to_string(),
                title: title.to_string(),
            },
            content.to_string(),
        )
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            rate_limit: Duration::from_millis(10),
            models: StageModels {
                map: "map-m".to_string(),
                reduce: "reduce-m".to_string(),
                summary: "summary-m".to_string(),
                script: "script-m".to_string(),
            },
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_combine_contents_layout() {
        let combined = combine_contents(&[
            source("https://a.test/1", "One", "alpha"),
            source("https://a.test/2", "", "beta"),
        ]);
        assert_eq!(
            combined,
            "--- SOURCE DOCUMENT 1 ---\nTITLE: One\nURL: https://a.test/1\n\nalpha\
             \n\n--- DOCUMENT END ---\n\n\
             --- SOURCE DOCUMENT 2 ---\nTITLE: https://a.test/2\nURL: https://a.test/2\n\nbeta"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_summarize_runs_every_stage_with_its_model() {
        let model = ScriptedModel::new(|_prompt, model| {
            let text = match model {
                "map-m" => "segment notes",
                "reduce-m" => "# Morning Brief\n\nEverything that happened.",
                "summary-m" => "A tidy summary.",
                "script-m" => "chatter <SCRIPT_START>\n[Host A] Hello.\n</SCRIPT_END> more",
                other => panic!("unexpected model {other}"),
            };
            Ok((text.to_string(), Duration::ZERO))
        });
        let summarizer = Summarizer::new(&model, &config());
        let script = summarizer
            .summarize(
                "Feed Title",
                &[source("https://a.test/1", "One", "alpha")],
                &CancelToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(script, "[Host A] Hello.");
        assert_eq!(
            model.models_called(),
            vec!["map-m", "reduce-m", "summary-m", "script-m"]
        );

        let calls = model.calls.lock().unwrap();
        assert!(calls[2].0.contains("Morning Brief"));
        assert!(!calls[2].0.contains("Feed Title"));
        assert!(calls[3].0.contains("A tidy summary."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_summarize_wraps_stage_errors() {
        let model = ScriptedModel::new(|_prompt, model| match model {
            "summary-m" => Err(model_error(model, "boom")),
            _ => Ok(("text".to_string(), Duration::ZERO)),
        });
        let summarizer = Summarizer::new(&model, &config());
        let err = summarizer
            .summarize("T", &[source("https://a.test/1", "One", "alpha")], &CancelToken::new())
            .await
            .unwrap_err();

        match err {
            Error::Stage { stage, source } => {
                assert_eq!(stage, StageName::FinalSummary);
                assert!(matches!(*source, Error::ModelCall { .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(model.models_called(), vec!["map-m", "reduce-m", "summary-m"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_summarize_stops_when_cancelled() {
        let model = ScriptedModel::new(|_, _| Ok(("text".to_string(), Duration::ZERO)));
        let summarizer = Summarizer::new(&model, &config());
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = summarizer
            .summarize("T", &[source("https://a.test/1", "One", "alpha")], &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(model.models_called().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_running_map_call() {
        let model = ScriptedModel::new(|_, _| Ok(("late".to_string(), Duration::from_secs(600))));
        let summarizer = Summarizer::new(&model, &config());
        let cancel = CancelToken::new();
        let _deadline = cancel.cancel_after(Duration::from_secs(2));

        let t0 = tokio::time::Instant::now();
        let err = summarizer
            .summarize("T", &[source("https://a.test/1", "One", "alpha")], &cancel)
            .await
            .unwrap_err();

        assert!(t0.elapsed() >= Duration::from_secs(2));
        assert!(t0.elapsed() < Duration::from_secs(600));
        assert!(err.is_cancelled());
        match err {
            Error::Stage {
                stage: StageName::Map,
                source,
            } => {
                let Error::SegmentAggregation(failures) = *source else {
                    panic!("expected a segment aggregation");
                };
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].position, 1);
                assert!(failures[0].cancelled);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(model.models_called(), vec!["map-m"]);
    }
}
