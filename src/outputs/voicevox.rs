//! Speech synthesis through a VOICEVOX engine.
//!
//! The engine's two-step HTTP protocol:
//! 1. `POST /audio_query?text=…&speaker=…` returns a JSON synthesis query
//! 2. `POST /synthesis?speaker=…` with that query as the body returns WAV bytes
//!
//! The query text travels in the URL, so long scripts are narrated in
//! chunks of at most [`MAX_CHUNK_CHARS`] characters and the resulting WAV
//! files are joined into one.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, instrument};

pub const DEFAULT_VOICEVOX_URL: &str = "http://127.0.0.1:50021";

pub const DEFAULT_SPEAKER: u32 = 3;

/// Upper bound for one `audio_query` text. Japanese text percent-encodes to
/// nine bytes per character.
pub const MAX_CHUNK_CHARS: usize = 200;

/// Synthesis of long scripts routinely outlives the ordinary HTTP timeout.
const SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(600);

/// `[Host A]`-style speaker labels at the start of a script line.
static SPEAKER_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*\[[^\]\n]{1,40}\]\s*").expect("valid regex"));

/// A run of text up to and including its sentence-ending punctuation, or the
/// unterminated tail of a line.
static SENTENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^。！？!?.]*[。！？!?.]+\s*|[^。！？!?.]+").expect("valid regex"));

/// Converts text to audio stored at `output_path`.
pub trait Synthesizer {
    async fn synthesize(&self, text: &str, output_path: &str) -> Result<()>;
}

impl<T: Synthesizer> Synthesizer for &T {
    async fn synthesize(&self, text: &str, output_path: &str) -> Result<()> {
        (**self).synthesize(text, output_path).await
    }
}

/// Strip speaker labels so they are not read aloud.
pub fn narration_text(script: &str) -> String {
    SPEAKER_LABEL.replace_all(script, "").trim().to_string()
}

/// Split narration into pieces the engine accepts, in reading order.
///
/// Lines are packed together while they fit in `max_chars`. A line that is
/// too long on its own is split at sentence ends, and a sentence that is
/// still too long is cut at a character boundary.
pub fn narration_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let pieces = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .flat_map(|line| split_line(line, max_chars));

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;
    for piece in pieces {
        let piece_chars = piece.chars().count();
        if !current.is_empty() && current_chars + 1 + piece_chars > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        if !current.is_empty() {
            current.push('\n');
            current_chars += 1;
        }
        current.push_str(&piece);
        current_chars += piece_chars;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_line(line: &str, max_chars: usize) -> Vec<String> {
    if line.chars().count() <= max_chars {
        return vec![line.to_string()];
    }

    let mut out = Vec::new();
    let mut current = String::new();
    for sentence in SENTENCE.find_iter(line).map(|m| m.as_str().trim()) {
        if sentence.is_empty() {
            continue;
        }
        let joined = current.chars().count() + sentence.chars().count();
        if !current.is_empty() && joined > max_chars {
            out.push(std::mem::take(&mut current));
        }
        if sentence.chars().count() > max_chars {
            let chars: Vec<char> = sentence.chars().collect();
            out.extend(chars.chunks(max_chars).map(|c| c.iter().collect::<String>()));
        } else {
            current.push_str(sentence);
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// The `fmt ` and `data` chunk bodies of a RIFF/WAVE file.
struct WavParts<'a> {
    fmt: &'a [u8],
    data: &'a [u8],
}

fn wav_parts(bytes: &[u8]) -> Result<WavParts<'_>> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(Error::Synthesis("engine returned a non-WAV payload".to_string()));
    }

    let (mut fmt, mut data) = (None, None);
    let mut pos = 12;
    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = u32::from_le_bytes([bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]]) as usize;
        let start = pos + 8;
        let end = start.saturating_add(size).min(bytes.len());
        match id {
            b"fmt " => fmt = Some(&bytes[start..end]),
            b"data" => data = Some(&bytes[start..end]),
            _ => {}
        }
        // Chunks are padded to an even length.
        pos = start.saturating_add(size).saturating_add(size & 1);
    }

    match (fmt, data) {
        (Some(fmt), Some(data)) => Ok(WavParts { fmt, data }),
        _ => Err(Error::Synthesis("WAV payload lacks a fmt or data chunk".to_string())),
    }
}

/// Concatenate WAV files that share one sample format.
fn join_wavs(wavs: &[Vec<u8>]) -> Result<Vec<u8>> {
    if let [single] = wavs {
        return Ok(single.clone());
    }

    let parts = wavs.iter().map(|w| wav_parts(w)).collect::<Result<Vec<_>>>()?;
    let Some(first) = parts.first() else {
        return Err(Error::Synthesis("no audio to join".to_string()));
    };
    if let Some(i) = parts.iter().position(|p| p.fmt != first.fmt) {
        return Err(Error::Synthesis(format!(
            "chunk {} has a different sample format than chunk 1",
            i + 1
        )));
    }

    let data_len: usize = parts.iter().map(|p| p.data.len()).sum();
    let fmt_pad = first.fmt.len() & 1;
    let data_pad = data_len & 1;
    let riff_len = 4 + 8 + first.fmt.len() + fmt_pad + 8 + data_len + data_pad;
    let size = |n: usize| {
        u32::try_from(n).map_err(|_| Error::Synthesis("joined audio exceeds the WAV size limit".to_string()))
    };

    let mut out = Vec::with_capacity(8 + riff_len);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&size(riff_len)?.to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&size(first.fmt.len())?.to_le_bytes());
    out.extend_from_slice(first.fmt);
    out.resize(out.len() + fmt_pad, 0);
    out.extend_from_slice(b"data");
    out.extend_from_slice(&size(data_len)?.to_le_bytes());
    for part in &parts {
        out.extend_from_slice(part.data);
    }
    out.resize(out.len() + data_pad, 0);
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct VoicevoxClient {
    http: Client,
    base_url: String,
    speaker: u32,
}

impl VoicevoxClient {
    pub fn new(http: Client, base_url: &str, speaker: u32) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            speaker,
        }
    }

    fn audio_query_url(&self, text: &str) -> String {
        format!(
            "{}/audio_query?text={}&speaker={}",
            self.base_url,
            urlencoding::encode(text),
            self.speaker
        )
    }

    fn synthesis_url(&self) -> String {
        format!("{}/synthesis?speaker={}", self.base_url, self.speaker)
    }
}

fn synthesis_error(step: &str, e: impl std::fmt::Display) -> Error {
    Error::Synthesis(format!("{step}: {e}"))
}

impl VoicevoxClient {
    /// Narrate one chunk and return the engine's WAV bytes.
    async fn synthesize_chunk(&self, chunk: &str) -> Result<Vec<u8>> {
        let query: serde_json::Value = self
            .http
            .post(self.audio_query_url(chunk))
            .timeout(SYNTHESIS_TIMEOUT)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| synthesis_error("audio_query", e))?
            .json()
            .await
            .map_err(|e| synthesis_error("audio_query", e))?;

        let wav = self
            .http
            .post(self.synthesis_url())
            .timeout(SYNTHESIS_TIMEOUT)
            .json(&query)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| synthesis_error("synthesis", e))?
            .bytes()
            .await
            .map_err(|e| synthesis_error("synthesis", e))?;
        Ok(wav.to_vec())
    }
}

impl Synthesizer for VoicevoxClient {
    #[instrument(level = "info", skip(self, text), fields(speaker = self.speaker))]
    async fn synthesize(&self, text: &str, output_path: &str) -> Result<()> {
        let chunks = narration_chunks(&narration_text(text), MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(Error::Synthesis("nothing to narrate".to_string()));
        }

        let mut wavs = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let wav = self.synthesize_chunk(chunk).await?;
            debug!(chunk = i + 1, of = chunks.len(), bytes = wav.len(), "Synthesized chunk");
            wavs.push(wav);
        }
        let wav = join_wavs(&wavs)?;

        tokio::fs::write(output_path, &wav)
            .await
            .map_err(|e| synthesis_error(output_path, e))?;
        info!(path = %output_path, chunks = chunks.len(), bytes = wav.len(), "Wrote synthesized audio");
        Ok(())
    }
}
