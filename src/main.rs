//! # Commit Scribe CLI (`scribe`)
//!
//! The `scribe` binary drives the commit ingestion and summarization
//! pipeline: registering repositories, polling them on demand or on an
//! interval, and inspecting the persisted commit log.
//!
//! ## Usage
//!
//! ```bash
//! scribe --config ./config/scribe.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scribe init` | Create the SQLite database and run schema migrations |
//! | `scribe repo add <url>` | Register a GitHub repository for tracking |
//! | `scribe repo list` | List registered repositories |
//! | `scribe poll <repo-id>` | Fetch, deduplicate, and ingest recent commits, then summarize them in the background |
//! | `scribe watch` | Poll all registered repositories on a fixed interval |
//! | `scribe log <repo-id>` | Show persisted commits and their summary state |
//!
//! Credentials come from the environment: `GITHUB_TOKEN` for the
//! version-control API and `GEMINI_API_KEY` for summarization.

mod config;
mod db;
mod enrich;
mod error;
mod github;
mod migrate;
mod models;
mod poll;
mod store;
mod summarize;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::github::{CommitSource, GithubClient};
use crate::models::SummaryState;
use crate::summarize::{GeminiClient, Summarizer};

/// Commit Scribe CLI — ingestion and AI summarization for Git commit
/// history.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/scribe.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "scribe",
    about = "Commit Scribe — commit ingestion and AI summarization for tracked repositories",
    version,
    long_about = "Commit Scribe polls the GitHub API for recent commits, persists new ones \
    immediately with a pending-summary placeholder, and enriches each in the background with \
    an AI-generated summary of its diff, paced to respect the provider's rate limit."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/scribe.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the repositories and commits
    /// tables. Idempotent — running it multiple times is safe.
    Init,

    /// Manage tracked repositories.
    Repo {
        #[command(subcommand)]
        action: RepoAction,
    },

    /// Poll a repository once: ingest new commits and summarize them.
    ///
    /// New commits are written immediately with a pending summary and are
    /// queryable right away; summaries arrive in the background. By
    /// default the command stays alive until every new summary is
    /// terminal; pass --detach to exit right after the ingestion write.
    Poll {
        /// Repository UUID (see `scribe repo list`).
        id: String,

        /// Exit after the ingestion write instead of waiting for
        /// background summaries to finish.
        #[arg(long)]
        detach: bool,
    },

    /// Poll every registered repository on a fixed interval.
    ///
    /// Runs until interrupted. Rate-limit responses from the source are
    /// logged and retried on the next sweep.
    Watch,

    /// Show persisted commits for a repository.
    ///
    /// Pending and failed summaries are rendered distinctly so a stalled
    /// enrichment is always visible.
    Log {
        /// Repository UUID.
        id: String,
    },
}

/// Repository management subcommands.
#[derive(Subcommand)]
enum RepoAction {
    /// Register a repository by its canonical GitHub URL.
    Add {
        /// Canonical remote URL, e.g. `https://github.com/rust-lang/cargo`.
        url: String,

        /// Display name. Defaults to the last URL segment.
        #[arg(long)]
        name: Option<String>,
    },

    /// List registered repositories.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Repo { action } => match action {
            RepoAction::Add { url, name } => {
                let name = name.unwrap_or_else(|| {
                    url.trim_end_matches('/')
                        .rsplit('/')
                        .next()
                        .unwrap_or(&url)
                        .trim_end_matches(".git")
                        .to_string()
                });
                let pool = db::connect(&cfg.db.path).await?;
                let repo = store::add_repository(&pool, &name, &url).await?;
                pool.close().await;
                println!("repo add");
                println!("  id: {}", repo.id);
                println!("  name: {}", repo.name);
                println!("  url: {}", repo.remote_url);
            }
            RepoAction::List => {
                let pool = db::connect(&cfg.db.path).await?;
                let repos = store::list_repositories(&pool).await?;
                pool.close().await;
                if repos.is_empty() {
                    println!("No repositories registered. Use `scribe repo add <url>`.");
                } else {
                    for repo in repos {
                        println!("{}  {}  {}", repo.id, repo.name, repo.remote_url);
                    }
                }
            }
        },
        Commands::Poll { id, detach } => {
            let pool = db::connect(&cfg.db.path).await?;
            let source: Arc<dyn CommitSource> = Arc::new(GithubClient::new(&cfg.github)?);
            let summarizer: Arc<dyn Summarizer> = Arc::new(GeminiClient::new(&cfg.summarizer)?);

            let outcome = poll::poll_repository(&pool, source, summarizer, &cfg, &id).await?;

            println!("poll {}", id);
            println!("  fetched: {} commits", outcome.total_fetched);
            println!("  written: {} new", outcome.written);

            if outcome.written > 0 && !detach {
                println!("  waiting for background summaries (Ctrl-C to abandon)...");
                // Bounded by the run's worst case, so an aborted
                // enrichment run cannot hang the command on rows stuck
                // at the pending sentinel.
                let deadline = enrich::worst_case_duration(
                    outcome.written,
                    &cfg.batching,
                    &cfg.summarizer,
                    cfg.github.diff_timeout_secs,
                );
                let drained = tokio::time::timeout(deadline, async {
                    loop {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        match store::count_pending(&pool, &id).await {
                            Ok(0) => break,
                            Ok(_) => {}
                            Err(e) => {
                                tracing::warn!(error = %e, "pending-summary check failed");
                                break;
                            }
                        }
                    }
                })
                .await;

                match drained {
                    Ok(()) => println!("  summaries complete"),
                    Err(_) => {
                        println!("  gave up waiting; some summaries are still pending (see logs)")
                    }
                }
            }
            pool.close().await;
        }
        Commands::Watch => {
            let pool = db::connect(&cfg.db.path).await?;
            let source: Arc<dyn CommitSource> = Arc::new(GithubClient::new(&cfg.github)?);
            let summarizer: Arc<dyn Summarizer> = Arc::new(GeminiClient::new(&cfg.summarizer)?);
            poll::run_watch(&pool, source, summarizer, &cfg).await?;
        }
        Commands::Log { id } => {
            let pool = db::connect(&cfg.db.path).await?;
            let commits = store::list_commits(&pool, &id).await?;
            pool.close().await;

            if commits.is_empty() {
                println!("No commits ingested for repository {}.", id);
            }
            for commit in commits {
                let short = &commit.hash[..commit.hash.len().min(8)];
                let subject = commit.message.lines().next().unwrap_or("");
                println!("{}  {}  {}  {}", short, commit.authored_at, commit.author_name, subject);
                match SummaryState::of(&commit.summary) {
                    SummaryState::Pending => println!("    [processing]"),
                    SummaryState::Failed => println!("    [failed — will not auto-retry]"),
                    SummaryState::Ready => {
                        for line in commit.summary.lines() {
                            println!("    {}", line);
                        }
                    }
                }
            }
        }
    }

    Ok(())
}
