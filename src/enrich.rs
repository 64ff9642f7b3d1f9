//! Background batch enrichment of newly ingested commits.
//!
//! The scheduler partitions commits into small fixed-size batches and
//! processes items strictly sequentially — concurrency would multiply the
//! effective request rate past the provider quota. A failing item writes
//! its failure sentinel and the batch moves on; nothing here ever
//! propagates to the caller that triggered ingestion.

use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::{BatchConfig, SummarizerConfig};
use crate::error::Result;
use crate::github::CommitSource;
use crate::models::{CommitDescriptor, SUMMARY_FAILED};
use crate::store;
use crate::summarize::{backoff_delay, Summarizer};

/// Launch the enrichment run detached from the caller. Errors from the
/// run (storage failures, in practice) land in the log sink, not in the
/// poll response.
pub fn spawn_enrichment(
    pool: SqlitePool,
    source: Arc<dyn CommitSource>,
    summarizer: Arc<dyn Summarizer>,
    batching: BatchConfig,
    repository_id: String,
    remote_url: String,
    commits: Vec<CommitDescriptor>,
) {
    tokio::spawn(async move {
        if let Err(e) = enrich_commits(
            &pool,
            source.as_ref(),
            summarizer.as_ref(),
            &batching,
            &repository_id,
            &remote_url,
            &commits,
        )
        .await
        {
            error!(repository = %repository_id, error = %e, "background enrichment run failed");
        }
    });
}

/// Enrich commits in order: fetch diff, summarize, persist the terminal
/// summary value keyed by (repository, hash).
///
/// Pacing: a fixed delay between items within a batch (skipped after the
/// last item) and a longer delay between batches (skipped after the last
/// batch). Items never overlap in time.
pub async fn enrich_commits(
    pool: &SqlitePool,
    source: &dyn CommitSource,
    summarizer: &dyn Summarizer,
    batching: &BatchConfig,
    repository_id: &str,
    remote_url: &str,
    commits: &[CommitDescriptor],
) -> Result<()> {
    if commits.is_empty() {
        return Ok(());
    }

    info!(
        repository = repository_id,
        commits = commits.len(),
        batch_size = batching.batch_size,
        "starting background enrichment"
    );

    let batches: Vec<&[CommitDescriptor]> = commits.chunks(batching.batch_size).collect();
    let batch_count = batches.len();

    for (batch_index, batch) in batches.iter().enumerate() {
        debug!(
            batch = batch_index + 1,
            of = batch_count,
            items = batch.len(),
            "processing enrichment batch"
        );

        for (item_index, commit) in batch.iter().enumerate() {
            let summary = match source.commit_diff(remote_url, &commit.hash).await {
                Ok(diff) => summarizer.summarize_diff(&diff).await,
                Err(e) => {
                    // One failed diff fetch must not abort the batch.
                    error!(hash = %commit.hash, error = %e, "diff fetch failed");
                    SUMMARY_FAILED.to_string()
                }
            };

            store::update_summary(pool, repository_id, &commit.hash, &summary).await?;
            debug!(hash = %commit.hash, "summary persisted");

            if item_index < batch.len() - 1 {
                tokio::time::sleep(Duration::from_millis(batching.item_delay_ms)).await;
            }
        }

        if batch_index < batch_count - 1 {
            tokio::time::sleep(Duration::from_millis(batching.batch_delay_ms)).await;
        }
    }

    info!(repository = repository_id, "background enrichment complete");
    Ok(())
}

/// Upper bound on how long an enrichment run over `items` commits can
/// take, assuming every diff fetch and generation call exhausts its
/// timeout and retry budget. The CLI uses this to bound its wait for a
/// detached run, so an aborted run cannot hang the caller forever.
pub fn worst_case_duration(
    items: u64,
    batching: &BatchConfig,
    summarizer: &SummarizerConfig,
    diff_timeout_secs: u64,
) -> Duration {
    if items == 0 {
        return Duration::ZERO;
    }

    let batches = items.div_ceil(batching.batch_size as u64);
    let backoff_total_ms: u64 = (0..summarizer.max_retries)
        .map(|attempt| backoff_delay(attempt, summarizer.base_retry_delay_ms).as_millis() as u64)
        .sum();
    let per_item_ms = diff_timeout_secs * 1000
        + summarizer.request_delay_ms
        + (summarizer.max_retries as u64 + 1) * summarizer.timeout_secs * 1000
        + backoff_total_ms;

    let total_ms = items * per_item_ms
        + (items - batches) * batching.item_delay_ms
        + (batches - 1) * batching.batch_delay_ms;

    // Slack for scheduling jitter and the persistence writes themselves.
    Duration::from_millis(total_ms) + Duration::from_secs(30)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_case_accounts_for_pacing_and_retries() {
        let batching = BatchConfig {
            batch_size: 2,
            item_delay_ms: 100,
            batch_delay_ms: 1000,
        };
        let summarizer = SummarizerConfig {
            request_delay_ms: 10,
            max_retries: 2,
            base_retry_delay_ms: 20,
            timeout_secs: 1,
            ..Default::default()
        };

        // 3 items in 2 batches. Per item: 5000 ms diff timeout + 10 ms
        // pre-request delay + 3 × 1000 ms call timeouts + (20 + 40) ms
        // backoff = 8070 ms. Plus one intra-batch delay, one inter-batch
        // delay, and the fixed slack.
        let bound = worst_case_duration(3, &batching, &summarizer, 5);
        assert_eq!(
            bound,
            Duration::from_millis(3 * 8070 + 100 + 1000) + Duration::from_secs(30)
        );
    }

    #[test]
    fn worst_case_is_zero_for_no_items() {
        let batching = BatchConfig {
            batch_size: 3,
            item_delay_ms: 3000,
            batch_delay_ms: 30_000,
        };
        assert_eq!(
            worst_case_duration(0, &batching, &SummarizerConfig::default(), 10),
            Duration::ZERO
        );
    }

    #[test]
    fn worst_case_grows_with_item_count() {
        let batching = BatchConfig {
            batch_size: 3,
            item_delay_ms: 3000,
            batch_delay_ms: 30_000,
        };
        let summarizer = SummarizerConfig::default();
        let one = worst_case_duration(1, &batching, &summarizer, 10);
        let many = worst_case_duration(9, &batching, &summarizer, 10);
        assert!(many > one);
    }
}
