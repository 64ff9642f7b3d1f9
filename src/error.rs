//! Typed errors for the ingestion pipeline.
//!
//! Every failure a caller might want to branch on is a distinct variant, so
//! orchestration code matches on kind rather than inspecting message text.
//! Rate limiting and missing remotes are expected conditions, not anomalies,
//! and get their own variants for that reason.

use thiserror::Error;

/// Failures surfaced by the synchronous polling path.
///
/// The detached enrichment path never produces these: its failures are
/// converted into per-commit failure sentinels and logged (see
/// [`crate::enrich`]).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required credential is absent from the environment. Fatal; there
    /// is no point retrying until the operator fixes the deployment.
    #[error("missing credential: {0}")]
    Configuration(String),

    /// The remote resource (repository, commit) does not exist upstream.
    #[error("remote resource not found: {0}")]
    NotFound(String),

    /// The upstream API quota is exhausted. Surfaced distinctly so the
    /// caller can present a "try again later" message.
    #[error("upstream rate limit exceeded")]
    RateLimited,

    /// A request exceeded its bounded timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Any other network or protocol failure.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The persisted store could not perform a read or write.
    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    /// The repository is registered but has no remote URL to poll.
    #[error("repository {0} has no remote URL configured")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Classify a reqwest error into the pipeline taxonomy.
    ///
    /// Timeouts get their own variant; everything else at this level is a
    /// transport failure. Status-code classification happens at the call
    /// site, where the response body is still available.
    pub fn from_request(err: reqwest::Error, context: &str) -> Self {
        if err.is_timeout() {
            PipelineError::Timeout(context.to_string())
        } else {
            PipelineError::Transport(format!("{}: {}", context, err))
        }
    }
}
