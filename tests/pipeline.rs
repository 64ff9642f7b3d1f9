//! In-process pipeline tests against fake source and summarizer
//! implementations: ingestion idempotence, non-blocking polls, batch
//! isolation, and sentinel handling.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use commit_scribe::config::{BatchConfig, Config, DbConfig, GithubConfig, SummarizerConfig, WatchConfig};
use commit_scribe::db;
use commit_scribe::enrich;
use commit_scribe::error::{PipelineError, Result};
use commit_scribe::github::CommitSource;
use commit_scribe::migrate;
use commit_scribe::models::{CommitDescriptor, SUMMARY_FAILED, SUMMARY_PENDING};
use commit_scribe::poll;
use commit_scribe::store;
use commit_scribe::summarize::{summary_or_sentinel, Summarizer};

const REMOTE_URL: &str = "https://github.com/example/widget";

/// Commit source fake: serves a configurable commit list and scripted
/// per-hash diff failures, recording the order of diff fetches.
struct FakeSource {
    commits: Mutex<Vec<CommitDescriptor>>,
    failing_diffs: HashSet<String>,
    diff_order: Mutex<Vec<String>>,
    /// When set, diff fetches never complete — used to observe pipeline
    /// state strictly before any enrichment happens.
    block_diffs: bool,
}

impl FakeSource {
    fn new(commits: Vec<CommitDescriptor>) -> Self {
        Self {
            commits: Mutex::new(commits),
            failing_diffs: HashSet::new(),
            diff_order: Mutex::new(Vec::new()),
            block_diffs: false,
        }
    }

    fn set_commits(&self, commits: Vec<CommitDescriptor>) {
        *self.commits.lock().unwrap() = commits;
    }
}

#[async_trait]
impl CommitSource for FakeSource {
    async fn recent_commits(
        &self,
        _remote_url: &str,
        page_size: usize,
    ) -> Result<Vec<CommitDescriptor>> {
        let mut commits = self.commits.lock().unwrap().clone();
        commits.truncate(page_size);
        Ok(commits)
    }

    async fn commit_diff(&self, _remote_url: &str, hash: &str) -> Result<String> {
        if self.block_diffs {
            std::future::pending::<()>().await;
        }
        self.diff_order.lock().unwrap().push(hash.to_string());
        if self.failing_diffs.contains(hash) {
            return Err(PipelineError::NotFound(format!("diff for {}", hash)));
        }
        Ok(format!("diff --git a/src/{}.rs b/src/{}.rs\n+changed", hash, hash))
    }
}

/// Summarizer fake that always succeeds with a recognizable summary.
struct OkSummarizer;

#[async_trait]
impl Summarizer for OkSummarizer {
    async fn summarize_diff(&self, diff: &str) -> String {
        format!("Summarized: {}", diff.lines().next().unwrap_or(""))
    }

    async fn summarize_source(&self, path: &str, _code: &str) -> String {
        format!("Purpose of {}", path)
    }

    async fn embed(&self, _text: &str) -> Vec<f32> {
        vec![0.0; 4]
    }
}

/// Summarizer fake whose generation always fails internally; exercises the
/// same error-to-sentinel collapse the real client uses.
struct FailingSummarizer;

#[async_trait]
impl Summarizer for FailingSummarizer {
    async fn summarize_diff(&self, _diff: &str) -> String {
        summary_or_sentinel(Err(PipelineError::Transport(
            "generation backend unavailable".to_string(),
        )))
    }

    async fn summarize_source(&self, _path: &str, _code: &str) -> String {
        summary_or_sentinel(Err(PipelineError::Transport(
            "generation backend unavailable".to_string(),
        )))
    }

    async fn embed(&self, _text: &str) -> Vec<f32> {
        vec![0.0; 4]
    }
}

fn descriptor(hash: &str) -> CommitDescriptor {
    CommitDescriptor {
        hash: hash.to_string(),
        message: format!("commit {}\n\nbody", hash),
        author_name: "Ada".to_string(),
        author_avatar: Some("https://example.com/ada.png".to_string()),
        authored_at: "2024-05-01T12:00:00Z".to_string(),
    }
}

fn zero_delay_batching() -> BatchConfig {
    BatchConfig {
        batch_size: 3,
        item_delay_ms: 0,
        batch_delay_ms: 0,
    }
}

fn test_config(tmp: &TempDir) -> Config {
    Config {
        db: DbConfig {
            path: tmp.path().join("scribe.sqlite"),
        },
        github: GithubConfig::default(),
        summarizer: SummarizerConfig::default(),
        batching: zero_delay_batching(),
        watch: WatchConfig::default(),
    }
}

async fn setup(config: &Config) -> (SqlitePool, String) {
    let pool = db::connect(&config.db.path).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    let repo = store::add_repository(&pool, "widget", REMOTE_URL)
        .await
        .unwrap();
    (pool, repo.id)
}

/// Wait until no commit for the repository still holds the pending
/// sentinel, i.e. the detached enrichment run has terminalized every row.
async fn wait_for_enrichment(pool: &SqlitePool, repo_id: &str) {
    for _ in 0..500 {
        if store::count_pending(pool, repo_id).await.unwrap() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("enrichment did not finish");
}

#[tokio::test]
async fn poll_scenario_counts_and_nonblocking_write() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let (pool, repo_id) = setup(&config).await;

    // Two of the five fetched commits are already persisted.
    store::insert_commits(&pool, &repo_id, &[descriptor("a"), descriptor("b")])
        .await
        .unwrap();

    let mut source = FakeSource::new(vec![
        descriptor("e"),
        descriptor("d"),
        descriptor("c"),
        descriptor("b"),
        descriptor("a"),
    ]);
    // Diff fetches hang forever: the poll must still return promptly.
    source.block_diffs = true;
    let source: Arc<dyn CommitSource> = Arc::new(source);
    let summarizer: Arc<dyn Summarizer> = Arc::new(OkSummarizer);

    let outcome = poll::poll_repository(&pool, source, summarizer, &config, &repo_id)
        .await
        .unwrap();

    assert_eq!(outcome.written, 3);
    assert_eq!(outcome.total_fetched, 5);

    // Every row is visible immediately; the new ones hold the pending
    // sentinel because no enrichment call has completed.
    let commits = store::list_commits(&pool, &repo_id).await.unwrap();
    assert_eq!(commits.len(), 5);
    for hash in ["c", "d", "e"] {
        let row = commits.iter().find(|c| c.hash == hash).unwrap();
        assert_eq!(row.summary, SUMMARY_PENDING);
    }
}

#[tokio::test]
async fn ingestion_is_idempotent_across_polls() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let (pool, repo_id) = setup(&config).await;

    let source = Arc::new(FakeSource::new(vec![descriptor("b"), descriptor("a")]));
    let summarizer: Arc<dyn Summarizer> = Arc::new(OkSummarizer);

    let first = poll::poll_repository(
        &pool,
        source.clone() as Arc<dyn CommitSource>,
        summarizer.clone(),
        &config,
        &repo_id,
    )
    .await
    .unwrap();
    assert_eq!(first.written, 2);
    wait_for_enrichment(&pool, &repo_id).await;

    // Second poll fetches a superset of the first.
    source.set_commits(vec![descriptor("c"), descriptor("b"), descriptor("a")]);
    let second = poll::poll_repository(
        &pool,
        source.clone() as Arc<dyn CommitSource>,
        summarizer,
        &config,
        &repo_id,
    )
    .await
    .unwrap();
    assert_eq!(second.written, 1);
    assert_eq!(second.total_fetched, 3);
    wait_for_enrichment(&pool, &repo_id).await;

    // |R2| rows by unique hash, never |R1| + |R2|.
    let commits = store::list_commits(&pool, &repo_id).await.unwrap();
    assert_eq!(commits.len(), 3);
}

#[tokio::test]
async fn batch_continues_past_failing_item() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let (pool, repo_id) = setup(&config).await;

    let commits = vec![descriptor("one"), descriptor("two"), descriptor("three")];
    store::insert_commits(&pool, &repo_id, &commits).await.unwrap();

    let mut source = FakeSource::new(commits.clone());
    source.failing_diffs.insert("two".to_string());

    enrich::enrich_commits(
        &pool,
        &source,
        &OkSummarizer,
        &zero_delay_batching(),
        &repo_id,
        REMOTE_URL,
        &commits,
    )
    .await
    .unwrap();

    let rows = store::list_commits(&pool, &repo_id).await.unwrap();
    let summary_of = |hash: &str| {
        rows.iter()
            .find(|c| c.hash == hash)
            .map(|c| c.summary.clone())
            .unwrap()
    };

    // Items 1 and 3 terminalize with real summaries despite item 2's
    // failed diff fetch.
    assert!(summary_of("one").starts_with("Summarized:"));
    assert_eq!(summary_of("two"), SUMMARY_FAILED);
    assert!(summary_of("three").starts_with("Summarized:"));
}

#[tokio::test]
async fn failed_generation_ends_with_sentinel_not_error() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let (pool, repo_id) = setup(&config).await;

    let commits = vec![descriptor("alpha")];
    store::insert_commits(&pool, &repo_id, &commits).await.unwrap();

    let source = FakeSource::new(commits.clone());
    enrich::enrich_commits(
        &pool,
        &source,
        &FailingSummarizer,
        &zero_delay_batching(),
        &repo_id,
        REMOTE_URL,
        &commits,
    )
    .await
    .unwrap();

    let rows = store::list_commits(&pool, &repo_id).await.unwrap();
    assert_eq!(rows[0].summary, SUMMARY_FAILED);
}

#[tokio::test]
async fn enrichment_processes_items_in_fetch_order() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let (pool, repo_id) = setup(&config).await;

    let commits: Vec<CommitDescriptor> =
        ["v", "w", "x", "y", "z"].into_iter().map(descriptor).collect();
    store::insert_commits(&pool, &repo_id, &commits).await.unwrap();

    let source = FakeSource::new(commits.clone());
    let batching = BatchConfig {
        batch_size: 2,
        item_delay_ms: 0,
        batch_delay_ms: 0,
    };

    enrich::enrich_commits(
        &pool,
        &source,
        &OkSummarizer,
        &batching,
        &repo_id,
        REMOTE_URL,
        &commits,
    )
    .await
    .unwrap();

    let order = source.diff_order.lock().unwrap().clone();
    assert_eq!(order, vec!["v", "w", "x", "y", "z"]);
}

#[tokio::test]
async fn poll_of_unregistered_repository_is_not_configured() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let (pool, _repo_id) = setup(&config).await;

    let source: Arc<dyn CommitSource> = Arc::new(FakeSource::new(vec![]));
    let summarizer: Arc<dyn Summarizer> = Arc::new(OkSummarizer);

    let err = poll::poll_repository(&pool, source, summarizer, &config, "missing-id")
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotConfigured(_)));
}

#[tokio::test]
async fn page_size_bounds_the_fetch() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(&tmp);
    config.github.page_size = 2;
    let (pool, repo_id) = setup(&config).await;

    let source: Arc<dyn CommitSource> = Arc::new(FakeSource::new(vec![
        descriptor("n1"),
        descriptor("n2"),
        descriptor("n3"),
    ]));
    let summarizer: Arc<dyn Summarizer> = Arc::new(OkSummarizer);

    let outcome = poll::poll_repository(&pool, source, summarizer, &config, &repo_id)
        .await
        .unwrap();
    assert_eq!(outcome.total_fetched, 2);
    assert_eq!(outcome.written, 2);
    wait_for_enrichment(&pool, &repo_id).await;
}
