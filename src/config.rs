use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub batching: BatchConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Version-control API settings. The bearer token itself comes from the
/// `GITHUB_TOKEN` environment variable, never from the config file.
#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    /// Maximum commits fetched per poll (newest first).
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Bounded timeout for a single diff fetch.
    #[serde(default = "default_diff_timeout_secs")]
    pub diff_timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            diff_timeout_secs: default_diff_timeout_secs(),
        }
    }
}

fn default_page_size() -> usize {
    20
}
fn default_diff_timeout_secs() -> u64 {
    10
}

/// Generative-AI call settings. Tuned for a free-tier quota of roughly
/// 15 requests per minute; the credential comes from `GEMINI_API_KEY`.
#[derive(Debug, Deserialize, Clone)]
pub struct SummarizerConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
    /// Fixed delay applied before every generation request, smoothing
    /// bursty call patterns.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    /// Retry budget for rate-limit class failures only.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff base: delay for attempt n is `base × 2^n`.
    #[serde(default = "default_base_retry_delay_ms")]
    pub base_retry_delay_ms: u64,
    /// Input is truncated to this many characters before submission.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            embed_model: default_embed_model(),
            request_delay_ms: default_request_delay_ms(),
            max_retries: default_max_retries(),
            base_retry_delay_ms: default_base_retry_delay_ms(),
            max_input_chars: default_max_input_chars(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_embed_model() -> String {
    "text-embedding-004".to_string()
}
fn default_request_delay_ms() -> u64 {
    1000
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_retry_delay_ms() -> u64 {
    2000
}
fn default_max_input_chars() -> usize {
    10_000
}
fn default_timeout_secs() -> u64 {
    30
}

/// Enrichment pacing. All rate limiting is client-side: correctness depends
/// on every enrichment path going through these delays.
#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    /// Commits enriched per batch, strictly sequentially.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Delay between items within a batch (skipped after the last item).
    #[serde(default = "default_item_delay_ms")]
    pub item_delay_ms: u64,
    /// Delay between batches (skipped after the last batch).
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            item_delay_ms: default_item_delay_ms(),
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

fn default_batch_size() -> usize {
    3
}
fn default_item_delay_ms() -> u64 {
    3000
}
fn default_batch_delay_ms() -> u64 {
    30_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    /// Interval between poll sweeps across all registered repositories.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    300
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.github.page_size == 0 {
        anyhow::bail!("github.page_size must be > 0");
    }

    if config.batching.batch_size == 0 {
        anyhow::bail!("batching.batch_size must be > 0");
    }

    if config.summarizer.max_input_chars == 0 {
        anyhow::bail!("summarizer.max_input_chars must be > 0");
    }

    if config.watch.interval_secs == 0 {
        anyhow::bail!("watch.interval_secs must be > 0");
    }

    Ok(config)
}
