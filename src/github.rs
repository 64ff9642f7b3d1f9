//! Version-control API adapter.
//!
//! [`GithubClient`] implements [`CommitSource`]: listing the most recent
//! commits for a repository and fetching the raw diff of a single commit.
//! Neither call retries internally — retry policy belongs to the caller
//! (the summarization backoff loop never wraps these).

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

use crate::config::GithubConfig;
use crate::error::{PipelineError, Result};
use crate::models::CommitDescriptor;

const API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "commit-scribe";

/// Source of commit history for a tracked repository.
///
/// Abstracted as a trait so the poll orchestrator and batch scheduler can
/// be exercised against in-process fakes.
#[async_trait]
pub trait CommitSource: Send + Sync {
    /// The most recent commits for `remote_url`, newest first, at most
    /// `page_size` entries.
    async fn recent_commits(
        &self,
        remote_url: &str,
        page_size: usize,
    ) -> Result<Vec<CommitDescriptor>>;

    /// The raw textual diff for one commit.
    async fn commit_diff(&self, remote_url: &str, hash: &str) -> Result<String>;
}

/// GitHub REST API client. Construction fails if no bearer token is
/// available; the credential is checked once, not per call.
pub struct GithubClient {
    http: reqwest::Client,
    token: String,
}

impl GithubClient {
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let token = std::env::var("GITHUB_TOKEN")
            .map_err(|_| PipelineError::Configuration("GITHUB_TOKEN is not set".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.diff_timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PipelineError::Transport(format!("building HTTP client: {}", e)))?;

        Ok(Self { http, token })
    }
}

/// Split a canonical `https://github.com/owner/repo` URL into its owner
/// and repository segments.
fn parse_remote_url(remote_url: &str) -> Result<(String, String)> {
    let path = remote_url
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .strip_prefix("https://github.com/")
        .ok_or_else(|| PipelineError::NotFound(format!("not a GitHub URL: {}", remote_url)))?;

    let mut parts = path.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(PipelineError::NotFound(format!(
            "invalid GitHub URL format: {}",
            remote_url
        ))),
    }
}

/// Classify a non-success GitHub response by status, not message text.
/// 403 is a rate limit only when the quota header says so.
fn classify_status(status: StatusCode, remaining: Option<&str>, context: &str) -> PipelineError {
    match status {
        StatusCode::NOT_FOUND => PipelineError::NotFound(context.to_string()),
        StatusCode::TOO_MANY_REQUESTS => PipelineError::RateLimited,
        StatusCode::FORBIDDEN if remaining == Some("0") => PipelineError::RateLimited,
        _ => PipelineError::Transport(format!("{}: HTTP {}", context, status)),
    }
}

#[async_trait]
impl CommitSource for GithubClient {
    async fn recent_commits(
        &self,
        remote_url: &str,
        page_size: usize,
    ) -> Result<Vec<CommitDescriptor>> {
        let (owner, repo) = parse_remote_url(remote_url)?;
        let url = format!(
            "{}/repos/{}/{}/commits?per_page={}",
            API_BASE, owner, repo, page_size
        );

        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| PipelineError::from_request(e, "listing commits"))?;

        let status = response.status();
        if !status.is_success() {
            let remaining = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string());
            return Err(classify_status(
                status,
                remaining.as_deref(),
                &format!("{}/{}", owner, repo),
            ));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::from_request(e, "decoding commit list"))?;

        let entries = body.as_array().ok_or_else(|| {
            PipelineError::Transport("commit list response is not an array".to_string())
        })?;

        Ok(entries.iter().map(descriptor_from_entry).collect())
    }

    async fn commit_diff(&self, remote_url: &str, hash: &str) -> Result<String> {
        let url = format!("{}/commit/{}.diff", remote_url.trim_end_matches('/'), hash);

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github.v3.diff")
            .header("Authorization", format!("token {}", self.token))
            .send()
            .await
            .map_err(|e| PipelineError::from_request(e, "fetching diff"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, None, &format!("diff for {}", hash)));
        }

        let diff = response
            .text()
            .await
            .map_err(|e| PipelineError::from_request(e, "reading diff body"))?;

        if diff.is_empty() {
            return Err(PipelineError::NotFound(format!("empty diff for {}", hash)));
        }

        Ok(diff)
    }
}

/// Map one GitHub commit-list entry to a descriptor. Missing fields fall
/// back to neutral values rather than dropping the commit.
fn descriptor_from_entry(entry: &serde_json::Value) -> CommitDescriptor {
    let author_name = entry["commit"]["author"]["name"]
        .as_str()
        .or_else(|| entry["author"]["login"].as_str())
        .unwrap_or("Unknown")
        .to_string();

    CommitDescriptor {
        hash: entry["sha"].as_str().unwrap_or_default().to_string(),
        message: entry["commit"]["message"]
            .as_str()
            .unwrap_or("No message")
            .to_string(),
        author_name,
        author_avatar: entry["author"]["avatar_url"].as_str().map(str::to_string),
        authored_at: entry["commit"]["author"]["date"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
    }
}
