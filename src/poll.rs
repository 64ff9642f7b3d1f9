//! Poll orchestration: the entry point for both the interval timer and
//! on-demand refresh.
//!
//! A poll cycle is synchronous up through the bulk ingestion write, then
//! detaches enrichment and returns. Callers must not assume summaries are
//! ready when this returns; newly written rows hold the pending sentinel.

use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::enrich;
use crate::error::{PipelineError, Result};
use crate::github::CommitSource;
use crate::models::CommitDescriptor;
use crate::store;
use crate::summarize::Summarizer;

/// Result of the synchronous portion of a poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Rows written by the ingestion pass (new, previously unseen commits).
    pub written: u64,
    /// Commits returned by the source fetch, seen or not.
    pub total_fetched: usize,
}

/// The subset of `fetched` whose hash is not already persisted, preserving
/// fetch order (newest first). Pure; the read side is [`store::seen_hashes`].
pub fn filter_unseen(
    fetched: Vec<CommitDescriptor>,
    seen: &HashSet<String>,
) -> Vec<CommitDescriptor> {
    fetched
        .into_iter()
        .filter(|c| !seen.contains(&c.hash))
        .collect()
}

/// Run one poll cycle for a repository: fetch recent commits, filter to
/// unseen, persist them with the pending sentinel, then detach enrichment
/// and return immediately.
///
/// A rate-limited fetch surfaces as [`PipelineError::RateLimited`] so the
/// caller can present a "try again later" message. Concurrent polls for
/// the same repository are tolerated: the dedup filter plus the insert's
/// conflict-ignore clause make the race produce wasted work, not
/// duplicate rows.
pub async fn poll_repository(
    pool: &SqlitePool,
    source: Arc<dyn CommitSource>,
    summarizer: Arc<dyn Summarizer>,
    config: &Config,
    repository_id: &str,
) -> Result<PollOutcome> {
    let repo = store::get_repository(pool, repository_id)
        .await?
        .ok_or_else(|| PipelineError::NotConfigured(repository_id.to_string()))?;

    let fetched = source
        .recent_commits(&repo.remote_url, config.github.page_size)
        .await?;
    let total_fetched = fetched.len();

    let seen = store::seen_hashes(pool, repository_id).await?;
    let unseen = filter_unseen(fetched, &seen);

    info!(
        repository = repository_id,
        fetched = total_fetched,
        unseen = unseen.len(),
        "poll fetch complete"
    );

    if unseen.is_empty() {
        return Ok(PollOutcome {
            written: 0,
            total_fetched,
        });
    }

    let written = store::insert_commits(pool, repository_id, &unseen).await?;
    if written < unseen.len() as u64 {
        // A concurrent poll got there first for some rows; the next cycle's
        // dedup pass self-heals anything missed.
        warn!(
            repository = repository_id,
            written,
            expected = unseen.len(),
            "partial ingestion write"
        );
    }

    enrich::spawn_enrichment(
        pool.clone(),
        source,
        summarizer,
        config.batching.clone(),
        repository_id.to_string(),
        repo.remote_url,
        unseen,
    );

    Ok(PollOutcome {
        written,
        total_fetched,
    })
}

/// Interval trigger surface: sweep every registered repository on a fixed
/// period, funneling into the same orchestrator as on-demand polls. Runs
/// until the process is terminated.
pub async fn run_watch(
    pool: &SqlitePool,
    source: Arc<dyn CommitSource>,
    summarizer: Arc<dyn Summarizer>,
    config: &Config,
) -> Result<()> {
    let period = Duration::from_secs(config.watch.interval_secs);

    loop {
        let repos = store::list_repositories(pool).await?;
        info!(repositories = repos.len(), "starting poll sweep");

        for repo in &repos {
            match poll_repository(pool, source.clone(), summarizer.clone(), config, &repo.id).await
            {
                Ok(outcome) => {
                    info!(
                        repository = %repo.name,
                        written = outcome.written,
                        fetched = outcome.total_fetched,
                        "poll complete"
                    );
                }
                Err(PipelineError::RateLimited) => {
                    warn!(repository = %repo.name, "source rate limited, will retry next sweep");
                }
                Err(e) => {
                    error!(repository = %repo.name, error = %e, "poll failed");
                }
            }
        }

        tokio::time::sleep(period).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(hash: &str) -> CommitDescriptor {
        CommitDescriptor {
            hash: hash.to_string(),
            message: format!("commit {}", hash),
            author_name: "Ada".to_string(),
            author_avatar: None,
            authored_at: "2024-05-01T12:00:00Z".to_string(),
        }
    }

    #[test]
    fn filter_preserves_order_and_drops_seen() {
        let fetched = vec![descriptor("c"), descriptor("b"), descriptor("a")];
        let seen: HashSet<String> = ["b".to_string()].into_iter().collect();

        let unseen = filter_unseen(fetched, &seen);
        let hashes: Vec<&str> = unseen.iter().map(|c| c.hash.as_str()).collect();
        assert_eq!(hashes, vec!["c", "a"]);
    }

    #[test]
    fn filter_with_nothing_seen_is_identity() {
        let fetched = vec![descriptor("x"), descriptor("y")];
        let unseen = filter_unseen(fetched.clone(), &HashSet::new());
        assert_eq!(unseen.len(), fetched.len());
    }

    #[test]
    fn filter_with_everything_seen_is_empty() {
        let fetched = vec![descriptor("x")];
        let seen: HashSet<String> = ["x".to_string()].into_iter().collect();
        assert!(filter_unseen(fetched, &seen).is_empty());
    }
}
