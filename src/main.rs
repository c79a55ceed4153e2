//! # Feed Narrator
//!
//! Turns an RSS or Atom feed into one narration-ready script: every article
//! is downloaded, the combined text is summarized by an OpenAI-compatible
//! language model in a map/reduce chain, and the resulting script is either
//! printed, written to a file or synthesized to speech with VOICEVOX.
//!
//! ## Usage
//!
//! ```sh
//! LLM_API_KEY=sk-... feed_narrator -f https://example.com/rss.xml -w out/narration.wav
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: resolve the feed into article links
//! 2. **Scraping**: download and extract article text, `--parallel` at a time
//! 3. **Summarizing**: map → reduce → final summary → script
//!    (or plain concatenation when no API key is configured)
//! 4. **Outputting**: WAV file, text file or stdout

use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cancel;
mod cli;
mod config;
mod error;
mod limiter;
mod models;
mod outputs;
mod pipeline;
mod prompts;
mod scrapers;
mod segmenter;
mod summarize;
mod utils;

use api::{ChatClient, RetryGenerate};
use cancel::CancelToken;
use cli::Cli;
use config::{AppConfig, FileConfig};
use outputs::text::FsSink;
use outputs::voicevox::VoicevoxClient;
use pipeline::Pipeline;
use scrapers::article::HtmlExtractor;
use scrapers::rss::HttpFeedResolver;
use summarize::Summarizer;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Model and speech calls run far longer than page downloads.
const LONG_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();

    // --- Tracing init ---
    // Logs go to stderr; stdout is reserved for the text output.
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tfmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("feed_narrator starting up");
    debug!(feed_url = %args.feed_url, parallel = args.parallel, "Parsed CLI arguments");

    let file_config = match args.config.as_deref() {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let app = AppConfig::resolve(&args, &file_config)?;
    debug!(?app, "Resolved configuration");

    let http = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(app.pipeline.http_timeout)
        .build()?;
    let long_http = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(LONG_REQUEST_TIMEOUT)
        .build()?;

    let summarizer = app.llm.as_ref().map(|llm| {
        info!(api_base = %llm.api_base, models = ?app.pipeline.models, "Summarization enabled");
        let client = ChatClient::new(long_http.clone(), &llm.api_base, &llm.api_key);
        let model = RetryGenerate::new(client, llm.max_retries, Duration::from_secs(1));
        Summarizer::new(model, &app.pipeline)
    });
    if summarizer.is_none() {
        warn!("No API key configured or --no-summarize given; articles will be concatenated as-is");
    }

    let synthesizer = (!app.pipeline.output_wav_path.is_empty()).then(|| {
        info!(url = %app.voicevox.url, speaker = app.voicevox.speaker, "Speech synthesis enabled");
        VoicevoxClient::new(long_http.clone(), &app.voicevox.url, app.voicevox.speaker)
    });

    let pipeline = Pipeline::new(
        HttpFeedResolver::new(http.clone()),
        HtmlExtractor::new(http),
        summarizer,
        synthesizer,
        FsSink,
        app.pipeline.clone(),
    );

    // --- Cancellation: deadline and Ctrl-C share one token ---
    let cancel = CancelToken::new();
    let deadline = cancel.cancel_after(app.pipeline.run_timeout);
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; cancelling run");
                cancel.cancel();
            }
        })
    };

    let outcome = pipeline.run(&app.feed_url, &cancel).await;
    deadline.abort();
    interrupt.abort();

    let summary = match outcome {
        Ok(summary) => summary,
        Err(e) if e.is_cancelled() => {
            warn!(elapsed_ms = start_time.elapsed().as_millis(), "Run cancelled before completion");
            return Err(e.into());
        }
        Err(e) => {
            error!(error = %e, "Run aborted");
            return Err(e.into());
        }
    };

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        feed = %summary.feed_title,
        attempted = summary.attempted,
        succeeded = summary.succeeded,
        summarized = summary.summarized,
        output = %summary.output,
        "Execution complete"
    );

    Ok(())
}
