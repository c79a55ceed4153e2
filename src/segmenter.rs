//! Splits the combined article text into model-sized segments.
//!
//! Sizes are counted in characters, never bytes, and split points always
//! fall on character boundaries. Segments concatenate back to the input
//! exactly.
//!
//! When the remaining text is longer than the budget, a window of exactly
//! `max_chars` characters is taken and the split point is the first match of:
//! 1. just after the last [`DOCUMENT_SEPARATOR`] inside the window
//! 2. just after the last [`PARAGRAPH_SEPARATOR`] inside the window
//! 3. just after the last punctuation or whitespace character among the
//!    final [`BREAK_LOOKBACK`] characters of the window
//! 4. a hard cut at the window end

use crate::models::Segment;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Placed between documents in the combined text.
pub const DOCUMENT_SEPARATOR: &str = "\n\n--- DOCUMENT END ---\n\n";

/// A plain paragraph break.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// How far back from the window end a soft break is searched for.
pub const BREAK_LOOKBACK: usize = 50;

/// Default per-segment budget in characters.
pub const DEFAULT_MAX_SEGMENT_CHARS: usize = 400_000;

static SOFT_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{P}\s]$").expect("static soft-break pattern"));

#[derive(Debug, Clone, Copy)]
pub struct Segmenter {
    max_chars: usize,
    verbose: bool,
}

impl Segmenter {
    /// A zero budget is raised to one character.
    pub fn new(max_chars: usize, verbose: bool) -> Self {
        Self {
            max_chars: max_chars.max(1),
            verbose,
        }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Split `text` into consecutive segments of at most `max_chars`
    /// characters each.
    ///
    /// Cut points follow the priority in the module docs.
    ///
    /// # Arguments
    ///
    /// * `text` - The combined article text
    ///
    /// # Returns
    ///
    /// Segments with 0-based positions. Concatenating their texts yields
    /// `text` unchanged, and no segment is empty. Empty input yields no
    /// segments.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let segmenter = Segmenter::new(14, false);
    /// let segments = segmenter.segment("first part\n\nsecond");
    /// assert_eq!(segments[0].text, "first part\n\n");
    /// assert_eq!(segments[1].text, "second");
    /// ```
    pub fn segment(&self, text: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut rest = text;

        while !rest.is_empty() {
            // Byte offset of the first character past the budget, if any.
            let Some((window_end, _)) = rest.char_indices().nth(self.max_chars) else {
                segments.push(Segment {
                    position: segments.len(),
                    text: rest.to_string(),
                });
                break;
            };

            let split = self.split_point(&rest[..window_end]);
            let (head, tail) = rest.split_at(split);
            segments.push(Segment {
                position: segments.len(),
                text: head.to_string(),
            });
            rest = tail;
        }

        debug!(
            segments = segments.len(),
            max_chars = self.max_chars,
            "Segmented combined text"
        );
        segments
    }

    /// Byte index within `window` at which to cut. Always greater than zero
    /// and on a character boundary.
    fn split_point(&self, window: &str) -> usize {
        if let Some(idx) = window.rfind(DOCUMENT_SEPARATOR) {
            return idx + DOCUMENT_SEPARATOR.len();
        }
        if let Some(idx) = window.rfind(PARAGRAPH_SEPARATOR) {
            return idx + PARAGRAPH_SEPARATOR.len();
        }

        let mut buf = [0u8; 4];
        let soft_break = window
            .char_indices()
            .rev()
            .take(BREAK_LOOKBACK)
            .find(|(_, c)| SOFT_BREAK.is_match(c.encode_utf8(&mut buf)));
        if let Some((idx, c)) = soft_break {
            return idx + c.len_utf8();
        }

        if self.verbose {
            warn!(
                max_chars = self.max_chars,
                "No natural break found near the segment limit; cutting hard"
            );
        }
        window.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn texts(segments: &[Segment]) -> Vec<&str> {
        segments.iter().map(|s| s.text.as_str()).collect()
    }

    fn assert_lossless(input: &str, segments: &[Segment], max_chars: usize) {
        let joined: String = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(joined, input);
        for (i, seg) in segments.iter().enumerate() {
            assert_eq!(seg.position, i);
            assert!(!seg.text.is_empty());
            assert!(
                seg.text.chars().count() <= max_chars,
                "segment {i} has {} chars, budget {max_chars}",
                seg.text.chars().count()
            );
        }
    }

    #[test]
    fn test_empty_text_yields_no_segments() {
        assert!(Segmenter::new(10, false).segment("").is_empty());
    }

    #[test]
    fn test_short_text_is_a_single_segment() {
        let segments = Segmenter::new(10, false).segment("short");
        assert_eq!(texts(&segments), vec!["short"]);

        // Exactly at the budget, counted in characters not bytes.
        let text = "ずんだもんです。あい";
        assert_eq!(text.chars().count(), 10);
        let segments = Segmenter::new(10, false).segment(text);
        assert_eq!(texts(&segments), vec![text]);
    }

    #[test]
    fn test_prefers_document_separator() {
        let text = format!("first doc\n\npara{DOCUMENT_SEPARATOR}second doc, longer text here");
        let budget = "first doc\n\npara".chars().count() + DOCUMENT_SEPARATOR.chars().count() + 5;
        let segments = Segmenter::new(budget, false).segment(&text);

        assert_eq!(segments[0].text, format!("first doc\n\npara{DOCUMENT_SEPARATOR}"));
        assert_lossless(&text, &segments, budget);
    }

    #[test]
    fn test_split_lands_after_last_document_separator() {
        let text = format!("a{DOCUMENT_SEPARATOR}b{DOCUMENT_SEPARATOR}ccccccccccccccccccccccccc");
        let last_end = text.rfind(DOCUMENT_SEPARATOR).unwrap() + DOCUMENT_SEPARATOR.len();
        let budget = text[..last_end].chars().count() + 3;

        let segments = Segmenter::new(budget, false).segment(&text);
        assert_eq!(segments[0].text.len(), last_end);
        assert_lossless(&text, &segments, budget);
    }

    #[test]
    fn test_falls_back_to_paragraph_break() {
        let text = "alpha beta\n\ngamma delta epsilon";
        let segments = Segmenter::new(15, false).segment(text);
        assert_eq!(segments[0].text, "alpha beta\n\n");
        assert_lossless(text, &segments, 15);
    }

    #[test]
    fn test_falls_back_to_punctuation_or_space() {
        let text = "one,two three";
        let segments = Segmenter::new(10, false).segment(text);
        assert_eq!(segments[0].text, "one,two ");
        assert_lossless(text, &segments, 10);

        let text = "日本語の文章です。続きの文章";
        let segments = Segmenter::new(11, false).segment(text);
        assert_eq!(segments[0].text, "日本語の文章です。");
        assert_lossless(text, &segments, 11);
    }

    #[test]
    fn test_soft_break_outside_lookback_is_ignored() {
        let mut text = String::from("x ");
        text.push_str(&"y".repeat(BREAK_LOOKBACK + 20));
        let budget = BREAK_LOOKBACK + 10;
        let segments = Segmenter::new(budget, true).segment(&text);

        // The only space sits further back than the lookback allows.
        assert_eq!(segments[0].text.chars().count(), budget);
        assert_lossless(&text, &segments, budget);
    }

    #[test]
    fn test_hard_cut_never_splits_multibyte_characters() {
        let text = "あ".repeat(25);
        let segments = Segmenter::new(7, false).segment(&text);
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[3].text, "あ".repeat(4));
        assert_lossless(&text, &segments, 7);
    }

    #[test]
    fn test_random_inputs_are_lossless_and_bounded() {
        let alphabet: Vec<char> = "ab c.\n日本語🦀é—,".chars().collect();
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..200 {
            let len = rng.random_range(0..400);
            let mut text: String = (0..len)
                .map(|_| alphabet[rng.random_range(0..alphabet.len())])
                .collect();
            if rng.random_bool(0.3) {
                let at = text.char_indices().map(|(i, _)| i).nth(len / 2).unwrap_or(text.len());
                text.insert_str(at, DOCUMENT_SEPARATOR);
            }
            let budget = rng.random_range(1..80);

            let segments = Segmenter::new(budget, false).segment(&text);
            assert_lossless(&text, &segments, budget);
        }
    }
}
