//! Delivery of the final text.
//!
//! # Submodules
//!
//! - [`text`]: writes to a file, or to stdout when no path is set
//! - [`voicevox`]: narrates the text into a WAV file
//!
//! Speech synthesis takes priority: when a synthesizer is available and a
//! WAV path is configured, the text goes to audio only. Otherwise it goes to
//! the text sink.

pub mod text;
pub mod voicevox;

use crate::cancel::CancelToken;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::utils::ensure_parent_dir;
use std::path::Path;
use text::TextSink;
use tracing::{info, instrument};
use voicevox::Synthesizer;

/// Where the final text ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Audio(String),
    File(String),
    Stdout,
}

impl std::fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputTarget::Audio(path) => write!(f, "audio:{path}"),
            OutputTarget::File(path) => write!(f, "file:{path}"),
            OutputTarget::Stdout => f.write_str("stdout"),
        }
    }
}

/// Send `text` to audio or text output according to `config`.
#[instrument(level = "info", skip_all, fields(chars = text.chars().count()))]
pub async fn route_output<S, K>(
    text: &str,
    config: &PipelineConfig,
    synthesizer: Option<&S>,
    sink: &K,
    cancel: &CancelToken,
) -> Result<OutputTarget>
where
    S: Synthesizer,
    K: TextSink,
{
    match synthesizer {
        Some(synth) if !config.output_wav_path.is_empty() => {
            let wav_path = config.output_wav_path.as_str();
            ensure_parent_dir(Path::new(wav_path))
                .await
                .map_err(|e| Error::Synthesis(format!("cannot create directory for {wav_path}: {e}")))?;
            cancel.run(synth.synthesize(text, wav_path)).await??;
            info!(path = %wav_path, "Narration saved");
            Ok(OutputTarget::Audio(wav_path.to_string()))
        }
        _ => {
            cancel.run(sink.write(&config.output_path, text)).await??;
            if config.output_path.is_empty() {
                Ok(OutputTarget::Stdout)
            } else {
                Ok(OutputTarget::File(config.output_path.clone()))
            }
        }
    }
}
