//! Map stage: summarize every segment concurrently.
//!
//! All segments are dispatched at once; the shared rate limiter is what
//! actually paces the model calls. Results land in a slot vector indexed by
//! segment order, so the output order never depends on completion order.
//!
//! A failed segment does not stop the others. Once every segment has
//! finished, all failures are reported together. A segment stopped by run
//! cancellation, at the limiter or mid-call, is reported the same way.

use super::Summarizer;
use crate::api::ModelCaller;
use crate::cancel::CancelToken;
use crate::error::{Error, Result, SegmentFailure};
use crate::models::{Segment, SegmentSummary};
use crate::prompts::{MapData, map_prompt};
use futures::stream::{self, StreamExt};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

impl<M: ModelCaller> Summarizer<M> {
    /// Summarize `segments`, returning one summary per segment in segment
    /// order, or [`Error::SegmentAggregation`] listing every failure by its
    /// 1-based position.
    #[instrument(level = "info", skip_all, fields(segments = segments.len()))]
    pub async fn map_segments(
        &self,
        segments: &[Segment],
        cancel: &CancelToken,
    ) -> Result<Vec<SegmentSummary>> {
        let t0 = Instant::now();
        let total = segments.len();
        let mut slots: Vec<Option<Result<String>>> =
            std::iter::repeat_with(|| None).take(total).collect();

        let mut outcomes = stream::iter(segments.iter().enumerate())
            .map(|(index, segment)| async move { (index, self.map_one(segment, cancel).await) })
            .buffer_unordered(total.max(1));

        while let Some((index, outcome)) = outcomes.next().await {
            slots[index] = Some(outcome);
        }
        drop(outcomes);

        let mut summaries = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (slot, segment) in slots.into_iter().zip(segments) {
            match slot {
                Some(Ok(text)) => summaries.push(SegmentSummary {
                    position: segment.position,
                    text,
                }),
                Some(Err(e)) => failures.push(SegmentFailure {
                    position: segment.position + 1,
                    message: e.to_string(),
                    cancelled: e.is_cancelled(),
                }),
                None => failures.push(SegmentFailure {
                    position: segment.position + 1,
                    message: "segment was never processed".to_string(),
                    cancelled: false,
                }),
            }
        }

        if !failures.is_empty() {
            let cancelled = failures.iter().filter(|f| f.cancelled).count();
            warn!(failed = failures.len(), cancelled, total, "Map stage had failing segments");
            return Err(Error::SegmentAggregation(failures));
        }

        info!(
            total,
            elapsed_ms = t0.elapsed().as_millis(),
            "Map stage complete"
        );
        Ok(summaries)
    }

    async fn map_one(&self, segment: &Segment, cancel: &CancelToken) -> Result<String> {
        let prompt = map_prompt(MapData {
            segment_text: &segment.text,
        })?;
        let text = self.call(&prompt, &self.models.map, cancel).await?;
        debug!(
            position = segment.position + 1,
            summary_chars = text.chars().count(),
            "Segment summarized"
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{ScriptedModel, model_error};
    use super::*;
    use crate::config::PipelineConfig;
    use std::time::Duration;

    fn segments(texts: &[&str]) -> Vec<Segment> {
        texts
            .iter()
            .enumerate()
            .map(|(position, text)| Segment {
                position,
                text: text.to_string(),
            })
            .collect()
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            rate_limit: Duration::from_millis(100),
            ..PipelineConfig::default()
        }
    }

    /// Replies with the segment marker found in the prompt, slower for
    /// earlier segments so completion order is reversed.
    fn reversed_delays(prompt: &str, _model: &str) -> Result<(String, Duration)> {
        for (marker, delay_ms) in [("SEG-A", 900), ("SEG-B", 500), ("SEG-C", 0)] {
            if prompt.contains(marker) {
                return Ok((format!("summary of {marker}"), Duration::from_millis(delay_ms)));
            }
        }
        Err(model_error("m", "no marker"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_map_preserves_segment_order() {
        let model = ScriptedModel::new(reversed_delays);
        let summarizer = Summarizer::new(&model, &config());
        let summaries = summarizer
            .map_segments(&segments(&["SEG-A", "SEG-B", "SEG-C"]), &CancelToken::new())
            .await
            .unwrap();

        let texts: Vec<_> = summaries.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["summary of SEG-A", "summary of SEG-B", "summary of SEG-C"]
        );
        let positions: Vec<_> = summaries.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_map_calls_are_rate_limited() {
        let model = ScriptedModel::new(|_, _| Ok(("s".to_string(), Duration::ZERO)));
        let summarizer = Summarizer::new(&model, &config());
        let t0 = tokio::time::Instant::now();
        summarizer
            .map_segments(&segments(&["a", "b", "c", "d"]), &CancelToken::new())
            .await
            .unwrap();
        assert!(t0.elapsed() >= Duration::from_millis(300));
        assert_eq!(model.calls.lock().unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_map_aggregates_failures_with_one_based_positions() {
        let model = ScriptedModel::new(|prompt, model| {
            if prompt.contains("BAD") {
                Err(model_error(model, "quota"))
            } else {
                Ok(("fine".to_string(), Duration::ZERO))
            }
        });
        let summarizer = Summarizer::new(&model, &config());
        let err = summarizer
            .map_segments(&segments(&["ok", "BAD", "ok", "BAD"]), &CancelToken::new())
            .await
            .unwrap_err();

        let Error::SegmentAggregation(failures) = &err else {
            panic!("unexpected error {err:?}");
        };
        let positions: Vec<_> = failures.iter().map(|f| f.position).collect();
        assert_eq!(positions, vec![2, 4]);
        assert!(failures[0].message.contains("quota"));
        assert!(err.to_string().contains("segment 2:"));
        // The healthy segments still ran.
        assert_eq!(model.calls.lock().unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_map_empty_segment_is_a_prompt_error() {
        let model = ScriptedModel::new(|_, _| Ok(("s".to_string(), Duration::ZERO)));
        let summarizer = Summarizer::new(&model, &config());
        let err = summarizer
            .map_segments(&segments(&["fine", ""]), &CancelToken::new())
            .await
            .unwrap_err();
        let Error::SegmentAggregation(failures) = err else {
            panic!("expected aggregation");
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].position, 2);
        assert!(failures[0].message.contains("segment_text"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_map_no_segments_is_empty() {
        let model = ScriptedModel::new(|_, _| Ok(("s".to_string(), Duration::ZERO)));
        let summarizer = Summarizer::new(&model, &config());
        let summaries = summarizer.map_segments(&[], &CancelToken::new()).await.unwrap();
        assert!(summaries.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_call_reports_every_pending_segment() {
        let model = ScriptedModel::new(|prompt, _| {
            let delay = if prompt.contains("QUICK") { 0 } else { 60_000 };
            Ok(("s".to_string(), Duration::from_millis(delay)))
        });
        let summarizer = Summarizer::new(&model, &config());
        let cancel = CancelToken::new();
        let _deadline = cancel.cancel_after(Duration::from_secs(1));

        let t0 = tokio::time::Instant::now();
        let err = summarizer
            .map_segments(&segments(&["QUICK", "slow", "slow"]), &cancel)
            .await
            .unwrap_err();

        assert!(t0.elapsed() < Duration::from_secs(60));
        assert!(err.is_cancelled());
        let Error::SegmentAggregation(failures) = err else {
            panic!("expected aggregation");
        };
        let positions: Vec<_> = failures.iter().map(|f| f.position).collect();
        assert_eq!(positions, vec![2, 3]);
        assert!(failures.iter().all(|f| f.cancelled));
        // Both slow calls were already running when the deadline hit.
        assert_eq!(model.calls.lock().unwrap().len(), 3);
    }
}
