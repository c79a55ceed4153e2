//! Sequential stages after the map phase: reduce, final summary, script.

use super::Summarizer;
use crate::api::ModelCaller;
use crate::cancel::CancelToken;
use crate::error::{Result, StageName};
use crate::models::SegmentSummary;
use crate::prompts::{
    FinalSummaryData, ReduceData, ScriptData, final_summary_prompt, reduce_prompt, script_prompt,
};
use crate::utils::truncate_for_log;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Placed between segment summaries in the reduce input.
pub const INTERMEDIATE_SEPARATOR: &str = "\n\n--- INTERMEDIATE SUMMARY END ---\n\n";

pub const SCRIPT_START_TAG: &str = "SCRIPT_START";
pub const SCRIPT_END_TAG: &str = "SCRIPT_END";

impl<M: ModelCaller> Summarizer<M> {
    /// Merge the map-stage summaries, in position order, into one
    /// intermediate summary.
    #[instrument(level = "info", skip_all, fields(summaries = summaries.len()))]
    pub async fn reduce(&self, summaries: &[SegmentSummary], cancel: &CancelToken) -> Result<String> {
        let mut ordered: Vec<&SegmentSummary> = summaries.iter().collect();
        ordered.sort_by_key(|s| s.position);
        let combined_text = ordered
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(INTERMEDIATE_SEPARATOR);

        self.stage(StageName::Reduce, &self.models.reduce, cancel, || {
            reduce_prompt(ReduceData {
                combined_text: &combined_text,
            })
        })
        .await
    }

    #[instrument(level = "info", skip_all, fields(%title))]
    pub async fn final_summary(
        &self,
        title: &str,
        intermediate_summary: &str,
        cancel: &CancelToken,
    ) -> Result<String> {
        self.stage(StageName::FinalSummary, &self.models.summary, cancel, || {
            final_summary_prompt(FinalSummaryData {
                title,
                intermediate_summary,
            })
        })
        .await
    }

    /// Generate the narration script. The text between the script markers
    /// is returned; without markers the whole response is.
    #[instrument(level = "info", skip_all, fields(%title))]
    pub async fn script(
        &self,
        title: &str,
        final_summary_text: &str,
        cancel: &CancelToken,
    ) -> Result<String> {
        let raw = self
            .stage(StageName::Script, &self.models.script, cancel, || {
                script_prompt(ScriptData {
                    title,
                    final_summary_text,
                })
            })
            .await?;

        match extract_between_tags(&raw, SCRIPT_START_TAG, SCRIPT_END_TAG) {
            Some(script) => Ok(script.to_string()),
            None => {
                warn!(
                    preview = %truncate_for_log(&raw, 100),
                    "Script markers not found; using the full response"
                );
                Ok(raw)
            }
        }
    }

    async fn stage<F>(
        &self,
        stage: StageName,
        model: &str,
        cancel: &CancelToken,
        build: F,
    ) -> Result<String>
    where
        F: FnOnce() -> Result<String>,
    {
        let t0 = Instant::now();
        let prompt = build().map_err(|e| e.in_stage(stage))?;
        debug!(%stage, %model, prompt_chars = prompt.chars().count(), "Calling model");
        let text = self
            .call(&prompt, model, cancel)
            .await
            .map_err(|e| e.in_stage(stage))?;
        info!(
            %stage,
            elapsed_ms = t0.elapsed().as_millis(),
            response_chars = text.chars().count(),
            "Stage complete"
        );
        Ok(text)
    }
}

/// The first non-empty `# ` heading of `markdown`, trimmed.
pub fn extract_title(markdown: &str) -> Option<&str> {
    markdown
        .lines()
        .find_map(|line| line.strip_prefix("# ").map(str::trim).filter(|t| !t.is_empty()))
}

/// Title for the later stages: the reduce output's heading, else the feed
/// title.
pub fn resolve_title(intermediate: &str, feed_title: &str) -> String {
    match extract_title(intermediate) {
        Some(title) => title.to_string(),
        None => {
            warn!(fallback = %feed_title, "No title heading in the reduce output");
            feed_title.to_string()
        }
    }
}

/// Trimmed text between `<START>` and `</END>` (or `<END>`), with tag names
/// upper-cased and matched case-insensitively.
///
/// Returns `None` when the start marker is missing, no end marker follows
/// it, or the enclosed text is blank.
pub fn extract_between_tags<'a>(text: &'a str, start_tag: &str, end_tag: &str) -> Option<&'a str> {
    // ASCII upper-casing keeps byte offsets valid for `text`.
    let haystack = text.to_ascii_uppercase();
    let start_marker = format!("<{}>", start_tag.to_ascii_uppercase());
    let end_tag = end_tag.to_ascii_uppercase();

    let body_start = haystack.find(&start_marker)? + start_marker.len();
    let tail = &haystack[body_start..];
    let body_len = tail
        .find(&format!("</{end_tag}>"))
        .or_else(|| tail.find(&format!("<{end_tag}>")))?;

    let body = text[body_start..body_start + body_len].trim();
    (!body.is_empty()).then_some(body)
}
