//! Language-model access with exponential backoff retry logic.
//!
//! # Architecture
//!
//! - [`ModelCaller`]: core trait, one prompt in, generated text out
//! - [`ChatClient`]: OpenAI-compatible `/chat/completions` implementation
//! - [`RetryGenerate`]: decorator adding retry logic to any [`ModelCaller`]
//!
//! Every summarization stage goes through the same caller and differs only
//! in the model identifier it passes.
//!
//! # Retry Strategy
//!
//! - Maximum 5 retry attempts by default
//! - Exponential backoff starting at 1 second
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use crate::error::{Error, Result};
use rand::{Rng, rng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

/// Default model identifier shared by every stage unless overridden.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default base URL of the OpenAI-compatible API.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Trait for async text generation.
///
/// Implementors send a fully rendered prompt to `model` and return the
/// generated text.
pub trait ModelCaller {
    async fn generate(&self, prompt: &str, model: &str) -> Result<String>;
}

impl<T: ModelCaller> ModelCaller for &T {
    async fn generate(&self, prompt: &str, model: &str) -> Result<String> {
        (**self).generate(prompt, model).await
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`ModelCaller`].
///
/// The delay between retries follows:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryGenerate<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryGenerate<T>
where
    T: ModelCaller,
{
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryGenerate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryGenerate")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> ModelCaller for RetryGenerate<T>
where
    T: ModelCaller,
{
    #[instrument(level = "debug", skip_all, fields(%model))]
    async fn generate(&self, prompt: &str, model: &str) -> Result<String> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.generate(prompt, model).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    attempt += 1;
                    let elapsed_ms_attempt = attempt_t0.elapsed().as_millis();
                    let elapsed_ms_total = total_t0.elapsed().as_millis();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt,
                            elapsed_ms_total,
                            error = %e,
                            "generate() exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt,
                        elapsed_ms_total,
                        ?delay,
                        error = %e,
                        "generate() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct ChatClient {
    http: Client,
    api_base: String,
    api_key: String,
}

impl ChatClient {
    pub fn new(http: Client, api_base: &str, api_key: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn model_error(model: &str, reason: impl fmt::Display) -> Error {
        Error::ModelCall {
            model: model.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("api_base", &self.api_base)
            .field("api_key", &"***")
            .finish()
    }
}

impl ModelCaller for ChatClient {
    #[instrument(level = "debug", skip_all, fields(%model, prompt_chars = prompt.len()))]
    async fn generate(&self, prompt: &str, model: &str) -> Result<String> {
        let t0 = Instant::now();
        let body = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::model_error(model, e))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(Self::model_error(
                model,
                format!("HTTP {status}: {}", crate::utils::truncate_for_log(&detail, 300)),
            ));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| Self::model_error(model, e))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Self::model_error(model, "response contained no text"))?;

        debug!(
            elapsed_ms = t0.elapsed().as_millis(),
            response_chars = text.len(),
            "Model call succeeded"
        );
        Ok(text)
    }
}
