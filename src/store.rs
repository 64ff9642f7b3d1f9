//! Persistence operations over the repositories and commits tables.
//!
//! All writes are either bulk inserts of new commit rows or single-row
//! summary updates keyed by (repository, hash), so no row is ever written
//! concurrently by two items and SQLite's own write atomicity suffices.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{CommitDescriptor, CommitRecord, Repository, SUMMARY_PENDING};

/// Register a repository. The remote URL is unique; registering the same
/// URL twice is an error surfaced to the caller.
pub async fn add_repository(pool: &SqlitePool, name: &str, remote_url: &str) -> Result<Repository> {
    let repo = Repository {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        remote_url: remote_url.to_string(),
        created_at: Utc::now(),
    };

    sqlx::query("INSERT INTO repositories (id, name, remote_url, created_at) VALUES (?, ?, ?, ?)")
        .bind(&repo.id)
        .bind(&repo.name)
        .bind(&repo.remote_url)
        .bind(repo.created_at.to_rfc3339())
        .execute(pool)
        .await?;

    Ok(repo)
}

pub async fn list_repositories(pool: &SqlitePool) -> Result<Vec<Repository>> {
    let rows = sqlx::query(
        "SELECT id, name, remote_url, created_at FROM repositories ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(repository_from_row).collect())
}

pub async fn get_repository(pool: &SqlitePool, id: &str) -> Result<Option<Repository>> {
    let row = sqlx::query("SELECT id, name, remote_url, created_at FROM repositories WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(repository_from_row))
}

fn repository_from_row(row: &sqlx::sqlite::SqliteRow) -> Repository {
    let created_at: String = row.get("created_at");
    Repository {
        id: row.get("id"),
        name: row.get("name"),
        remote_url: row.get("remote_url"),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default(),
    }
}

/// All commit hashes already persisted for a repository. Zero rows is a
/// valid empty result, not an error.
pub async fn seen_hashes(pool: &SqlitePool, repository_id: &str) -> Result<HashSet<String>> {
    let hashes: Vec<String> =
        sqlx::query_scalar("SELECT commit_hash FROM commits WHERE repository_id = ?")
            .bind(repository_id)
            .fetch_all(pool)
            .await?;

    Ok(hashes.into_iter().collect())
}

/// Persist unseen commits in one transaction, each with the pending
/// summary sentinel. Returns the number of rows actually written.
///
/// `ON CONFLICT DO NOTHING` makes the insert safe under concurrent polls:
/// the dedup filter is the authoritative gate, but a race between two
/// read-then-filter passes degrades to a lower written count, never to a
/// duplicate row.
pub async fn insert_commits(
    pool: &SqlitePool,
    repository_id: &str,
    commits: &[CommitDescriptor],
) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut written = 0u64;

    for commit in commits {
        let result = sqlx::query(
            r#"
            INSERT INTO commits (id, repository_id, commit_hash, message, author_name, author_avatar, authored_at, summary)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(repository_id, commit_hash) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(repository_id)
        .bind(&commit.hash)
        .bind(&commit.message)
        .bind(&commit.author_name)
        .bind(&commit.author_avatar)
        .bind(&commit.authored_at)
        .bind(SUMMARY_PENDING)
        .execute(&mut *tx)
        .await?;

        written += result.rows_affected();
    }

    tx.commit().await?;
    Ok(written)
}

/// Targeted summary update keyed by (repository, hash). Idempotent: a
/// repeated write of the same terminal value is harmless.
pub async fn update_summary(
    pool: &SqlitePool,
    repository_id: &str,
    hash: &str,
    summary: &str,
) -> Result<()> {
    sqlx::query("UPDATE commits SET summary = ? WHERE repository_id = ? AND commit_hash = ?")
        .bind(summary)
        .bind(repository_id)
        .bind(hash)
        .execute(pool)
        .await?;

    Ok(())
}

/// Number of commits for a repository still holding the pending sentinel.
/// Used by the CLI to wait out a background enrichment run.
pub async fn count_pending(pool: &SqlitePool, repository_id: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM commits WHERE repository_id = ? AND summary = ?",
    )
    .bind(repository_id)
    .bind(SUMMARY_PENDING)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Commits for a repository, newest first — the read side that observes
/// pending and failed sentinels.
pub async fn list_commits(pool: &SqlitePool, repository_id: &str) -> Result<Vec<CommitRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, repository_id, commit_hash, message, author_name, author_avatar, authored_at, summary
        FROM commits
        WHERE repository_id = ?
        ORDER BY authored_at DESC
        "#,
    )
    .bind(repository_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| CommitRecord {
            id: row.get("id"),
            repository_id: row.get("repository_id"),
            hash: row.get("commit_hash"),
            message: row.get("message"),
            author_name: row.get("author_name"),
            author_avatar: row.get("author_avatar"),
            authored_at: row.get("authored_at"),
            summary: row.get("summary"),
        })
        .collect())
}
