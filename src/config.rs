//! Run configuration.
//!
//! Values come from three places, highest precedence first:
//! 1. command-line flags ([`Cli`])
//! 2. the optional YAML file given with `--config`
//! 3. built-in defaults
//!
//! The resolved [`PipelineConfig`] is immutable for the rest of the run.
//!
//! # YAML layout
//!
//! ```yaml
//! llm:
//!   api_base: https://api.openai.com/v1
//!   api_key: sk-...
//!   model: gpt-4o-mini
//!   max_retries: 5
//! voicevox:
//!   url: http://127.0.0.1:50021
//!   speaker: 3
//! ```

use crate::api::{DEFAULT_API_BASE, DEFAULT_MODEL};
use crate::cli::Cli;
use crate::error::{Error, Result};
use crate::outputs::voicevox::{DEFAULT_SPEAKER, DEFAULT_VOICEVOX_URL};
use crate::segmenter::DEFAULT_MAX_SEGMENT_CHARS;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument};

/// Default number of retries around each model call.
pub const DEFAULT_MAX_RETRIES: usize = 5;

/// Model identifier for each summarization stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageModels {
    pub map: String,
    pub reduce: String,
    pub summary: String,
    pub script: String,
}

impl StageModels {
    /// The same model for every stage.
    pub fn uniform(model: &str) -> Self {
        Self {
            map: model.to_string(),
            reduce: model.to_string(),
            summary: model.to_string(),
            script: model.to_string(),
        }
    }
}

impl Default for StageModels {
    fn default() -> Self {
        Self::uniform(DEFAULT_MODEL)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on concurrent article fetches.
    pub parallel: usize,
    /// Character budget of one map-phase segment.
    pub max_segment_chars: usize,
    /// Minimum spacing between model calls.
    pub rate_limit: Duration,
    pub models: StageModels,
    /// Empty disables speech synthesis.
    pub output_wav_path: String,
    /// Empty means stdout.
    pub output_path: String,
    pub verbose: bool,
    pub http_timeout: Duration,
    /// Deadline for the whole run.
    pub run_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            parallel: 10,
            max_segment_chars: DEFAULT_MAX_SEGMENT_CHARS,
            rate_limit: Duration::from_secs(1),
            models: StageModels::default(),
            output_wav_path: String::new(),
            output_path: String::new(),
            verbose: false,
            http_timeout: Duration::from_secs(30),
            run_timeout: Duration::from_secs(20 * 60),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.parallel == 0 {
            return Err(Error::Config("parallel must be at least 1".to_string()));
        }
        if self.max_segment_chars == 0 {
            return Err(Error::Config(
                "max_segment_chars must be at least 1".to_string(),
            ));
        }
        if self.run_timeout.is_zero() {
            return Err(Error::Config("timeout must be positive".to_string()));
        }
        Ok(())
    }
}

/// Connection settings for the model API. Present only when a key is known.
#[derive(Clone)]
pub struct LlmSettings {
    pub api_base: String,
    pub api_key: String,
    pub max_retries: usize,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("api_base", &self.api_base)
            .field("api_key", &"***")
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoicevoxSettings {
    pub url: String,
    pub speaker: u32,
}

/// Everything `main` needs to wire up a run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub feed_url: String,
    pub pipeline: PipelineConfig,
    /// `None` selects raw concatenation instead of summarization.
    pub llm: Option<LlmSettings>,
    pub voicevox: VoicevoxSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub llm: LlmSection,
    pub voicevox: VoicevoxSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub max_retries: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VoicevoxSection {
    pub url: Option<String>,
    pub speaker: Option<u32>,
}

impl FileConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::Config(format!("invalid YAML: {e}")))
    }

    #[instrument(level = "info")]
    pub fn load(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {path}: {e}")))?;
        let config = Self::from_yaml(&text)?;
        info!(path, "Loaded configuration file");
        Ok(config)
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

impl AppConfig {
    /// Merge CLI flags over the file config and validate the result.
    pub fn resolve(cli: &Cli, file: &FileConfig) -> Result<Self> {
        let shared_model = non_empty(cli.model.as_ref())
            .or(non_empty(file.llm.model.as_ref()))
            .unwrap_or(DEFAULT_MODEL);
        let stage = |flag: &Option<String>| {
            non_empty(flag.as_ref()).unwrap_or(shared_model).to_string()
        };
        let models = StageModels {
            map: stage(&cli.map_model),
            reduce: stage(&cli.reduce_model),
            summary: stage(&cli.summary_model),
            script: stage(&cli.script_model),
        };

        let pipeline = PipelineConfig {
            parallel: cli.parallel,
            max_segment_chars: cli.max_segment_chars,
            rate_limit: Duration::from_millis(cli.rate_limit_ms),
            models,
            output_wav_path: cli.output_wav_path.trim().to_string(),
            output_path: cli.output.trim().to_string(),
            verbose: cli.verbose,
            http_timeout: Duration::from_secs(cli.http_timeout_secs),
            run_timeout: Duration::from_secs(cli.timeout_secs),
        };
        pipeline.validate()?;

        let api_key = non_empty(cli.api_key.as_ref()).or(non_empty(file.llm.api_key.as_ref()));
        let llm = match api_key {
            Some(key) if !cli.no_summarize => Some(LlmSettings {
                api_base: non_empty(cli.api_base.as_ref())
                    .or(non_empty(file.llm.api_base.as_ref()))
                    .unwrap_or(DEFAULT_API_BASE)
                    .to_string(),
                api_key: key.to_string(),
                max_retries: file.llm.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            }),
            _ => None,
        };

        let voicevox = VoicevoxSettings {
            url: non_empty(cli.voicevox_url.as_ref())
                .or(non_empty(file.voicevox.url.as_ref()))
                .unwrap_or(DEFAULT_VOICEVOX_URL)
                .to_string(),
            speaker: cli
                .speaker
                .or(file.voicevox.speaker)
                .unwrap_or(DEFAULT_SPEAKER),
        };

        Ok(Self {
            feed_url: cli.feed_url.trim().to_string(),
            pipeline,
            llm,
            voicevox,
        })
    }
}
