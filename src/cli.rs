//! Command-line interface definitions.
//!
//! Secrets and endpoints can also come from environment variables or from
//! the YAML file passed with `--config`; see [`crate::config`] for the
//! precedence rules.

use crate::segmenter::DEFAULT_MAX_SEGMENT_CHARS;
use clap::Parser;

/// Fetch a feed, summarize its articles and narrate the result.
///
/// # Examples
///
/// ```sh
/// # Raw concatenation of every article, printed to stdout
/// feed_narrator -f https://example.com/rss.xml --no-summarize
///
/// # Full summarization chain, script written to a file
/// LLM_API_KEY=sk-... feed_narrator -f https://example.com/rss.xml -o out/script.md
///
/// # Narrated to a WAV file through a local VOICEVOX engine
/// feed_narrator -f https://example.com/rss.xml -w asset/audio_output.wav
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// RSS or Atom feed URL to process
    #[arg(short, long)]
    pub feed_url: String,

    /// Maximum number of articles fetched at the same time
    #[arg(short, long, default_value_t = 10)]
    pub parallel: usize,

    /// Per-request HTTP timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// Deadline for the whole run in seconds
    #[arg(long, default_value_t = 1200)]
    pub timeout_secs: u64,

    /// Character budget of one map-phase segment
    #[arg(long, default_value_t = DEFAULT_MAX_SEGMENT_CHARS)]
    pub max_segment_chars: usize,

    /// Minimum spacing between model calls, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub rate_limit_ms: u64,

    /// Model used by every stage unless a stage-specific model is given
    #[arg(long)]
    pub model: Option<String>,

    /// Model for the per-segment map phase
    #[arg(long)]
    pub map_model: Option<String>,

    /// Model for the reduce phase
    #[arg(long)]
    pub reduce_model: Option<String>,

    /// Model for the final summary
    #[arg(long)]
    pub summary_model: Option<String>,

    /// Model for script generation
    #[arg(long)]
    pub script_model: Option<String>,

    /// Write synthesized speech to this WAV file (empty disables synthesis)
    #[arg(short = 'w', long, default_value = "")]
    pub output_wav_path: String,

    /// Write the final text to this file (empty writes to stdout)
    #[arg(short, long, default_value = "")]
    pub output: String,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "LLM_API_BASE")]
    pub api_base: Option<String>,

    /// API key; summarization is skipped when none is configured
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the VOICEVOX engine
    #[arg(long, env = "VOICEVOX_URL")]
    pub voicevox_url: Option<String>,

    /// VOICEVOX speaker id
    #[arg(long)]
    pub speaker: Option<u32>,

    /// Skip the language-model stages and concatenate articles as-is
    #[arg(long)]
    pub no_summarize: bool,

    /// Enable debug logging and non-essential warnings
    #[arg(short, long)]
    pub verbose: bool,

    /// Optional path to a config.yaml file
    #[arg(short, long)]
    pub config: Option<String>,
}
