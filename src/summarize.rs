//! Generative-AI summarization client.
//!
//! [`GeminiClient`] wraps the Gemini generateContent / embedContent calls
//! with client-side pacing: a fixed pre-request delay, input truncation,
//! and exponential backoff on rate-limit class failures. The external
//! quota is protected purely by this pacing, so every enrichment path must
//! go through one of these methods.
//!
//! # Retry strategy
//!
//! - Rate-limit class failure (HTTP 429, or 403 carrying a quota message)
//!   → retry up to `max_retries` with delay `base × 2^attempt`.
//! - Any other failure → fail immediately.
//! - Exhausted retries or a non-retryable failure never propagate: the
//!   caller receives the fixed failure sentinel and the error is logged.
//!   One bad summarization must not abort the enclosing batch.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::SummarizerConfig;
use crate::error::{PipelineError, Result};
use crate::models::SUMMARY_FAILED;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Dimensionality of the embedding model's output; also the length of the
/// zero-vector fallback.
pub const EMBEDDING_DIMS: usize = 768;

const DIFF_PROMPT: &str = "You are an expert programmer summarizing a git diff. \
For every file the diff contains a few metadata lines such as \
'diff --git a/lib/index.js b/lib/index.js', meaning 'lib/index.js' was modified. \
A line starting with '+' was added, a line starting with '-' was deleted, and a \
line starting with neither is context. Write a short bullet list of the changes, \
naming the affected files in brackets when only one or two files are relevant.";

/// Produces natural-language summaries and embeddings.
///
/// Implementations never return errors from the summarization methods;
/// they degrade to sentinel values instead, so a batch keeps moving past
/// an individual failure.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize a unit of raw diff text. Returns the failure sentinel on
    /// any terminal error.
    async fn summarize_diff(&self, diff: &str) -> String;

    /// Summarize a source file (onboarding-style, ~100 words). Shares the
    /// retry and pacing machinery with diff summarization.
    async fn summarize_source(&self, path: &str, code: &str) -> String;

    /// Embed a text. Returns a zero vector of [`EMBEDDING_DIMS`] on failure.
    async fn embed(&self, text: &str) -> Vec<f32>;
}

/// Gemini API client. Construction fails if `GEMINI_API_KEY` is absent;
/// the credential is checked once, never per call.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    config: SummarizerConfig,
}

impl GeminiClient {
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| PipelineError::Configuration("GEMINI_API_KEY is not set".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Transport(format!("building HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            base_url: API_BASE.to_string(),
            config: config.clone(),
        })
    }

    /// Point the client at a different models endpoint (e.g. a proxy).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// One generateContent call, no retry. Rate-limit responses map to
    /// [`PipelineError::RateLimited`] so the retry loop can branch on kind.
    async fn generate_once(&self, parts: &[&str]) -> Result<String> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            self.base_url, self.config.model, self.api_key
        );

        let body = serde_json::json!({
            "contents": [{
                "parts": parts.iter().map(|p| serde_json::json!({ "text": p })).collect::<Vec<_>>(),
            }],
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::from_request(e, "generateContent"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text, "generateContent"));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::from_request(e, "decoding generateContent"))?;

        json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PipelineError::Transport("empty generation response".to_string()))
    }

    /// Pacing wrapper: fixed pre-request delay, then retry on rate-limit
    /// class errors with exponential backoff.
    async fn generate_with_retry(&self, parts: &[&str]) -> Result<String> {
        tokio::time::sleep(Duration::from_millis(self.config.request_delay_ms)).await;

        retry_on_rate_limit(
            || self.generate_once(parts),
            self.config.max_retries,
            self.config.base_retry_delay_ms,
        )
        .await
    }

    /// One embedContent call, no retry.
    async fn embed_once(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!(
            "{}/{}:embedContent?key={}",
            self.base_url, self.config.embed_model, self.api_key
        );

        let body = serde_json::json!({
            "content": { "parts": [{ "text": text }] },
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::from_request(e, "embedContent"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text, "embedContent"));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::from_request(e, "decoding embedContent"))?;

        let values = json["embedding"]["values"].as_array().ok_or_else(|| {
            PipelineError::Transport("embedding response missing values".to_string())
        })?;

        Ok(values
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect())
    }
}

/// Classify a non-success generation API response: HTTP 429, or a 403
/// whose body names a quota problem, is the rate-limit class that the
/// retry loop backs off on; anything else fails immediately.
fn classify_status(status: StatusCode, body: &str, context: &str) -> PipelineError {
    if status.as_u16() == 429 || (status.as_u16() == 403 && body.contains("quota")) {
        PipelineError::RateLimited
    } else {
        PipelineError::Transport(format!("{}: HTTP {}: {}", context, status, body))
    }
}

/// Run `op` until it succeeds or fails with a non-rate-limit error.
/// Rate-limit failures are retried up to `max_retries` times with delay
/// `base × 2^attempt`; an exhausted budget yields the rate-limit error.
async fn retry_on_rate_limit<T, F, Fut>(mut op: F, max_retries: u32, base_delay_ms: u64) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 0..=max_retries {
        match op().await {
            Ok(value) => return Ok(value),
            Err(PipelineError::RateLimited) if attempt < max_retries => {
                let wait = backoff_delay(attempt, base_delay_ms);
                warn!(
                    attempt = attempt + 1,
                    max = max_retries,
                    wait_ms = wait.as_millis() as u64,
                    "rate limited by generation API, backing off"
                );
                tokio::time::sleep(wait).await;
            }
            Err(e) => return Err(e),
        }
    }

    Err(PipelineError::RateLimited)
}

#[async_trait]
impl Summarizer for GeminiClient {
    async fn summarize_diff(&self, diff: &str) -> String {
        let diff = truncate_chars(diff, self.config.max_input_chars);
        let request = format!("Please summarize the following diff:\n\n{}", diff);

        summary_or_sentinel(self.generate_with_retry(&[DIFF_PROMPT, &request]).await)
    }

    async fn summarize_source(&self, path: &str, code: &str) -> String {
        let code = truncate_chars(code, self.config.max_input_chars);
        let role = "You are a senior software engineer onboarding a junior engineer onto a project.";
        let request = format!(
            "Explain the purpose of the {} file in no more than 100 words.\nHere is the code:\n---\n{}\n---",
            path, code
        );

        summary_or_sentinel(self.generate_with_retry(&[role, &request]).await)
    }

    async fn embed(&self, text: &str) -> Vec<f32> {
        let result = retry_on_rate_limit(
            || self.embed_once(text),
            self.config.max_retries,
            self.config.base_retry_delay_ms,
        )
        .await;

        match result {
            Ok(vec) => vec,
            Err(e) => {
                warn!(error = %e, "embedding failed, falling back to zero vector");
                vec![0.0; EMBEDDING_DIMS]
            }
        }
    }
}

/// Collapse a generation outcome into the value persisted on a commit:
/// the summary text, or the failure sentinel for a failed or empty
/// generation. This is the point where summarization errors stop
/// propagating, keeping one bad item from aborting its batch.
pub fn summary_or_sentinel(result: Result<String>) -> String {
    match result {
        Ok(summary) if !summary.trim().is_empty() => summary,
        Ok(_) => SUMMARY_FAILED.to_string(),
        Err(e) => {
            warn!(error = %e, "summarization failed");
            SUMMARY_FAILED.to_string()
        }
    }
}

/// Delay before retry `attempt` (indexed from 0): `base × 2^attempt`.
pub fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(1u64 << attempt.min(32)))
}

/// Truncate to at most `max` characters, respecting char boundaries.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
