use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema. Every statement is idempotent, so `scribe init` can
/// be run repeatedly.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repositories (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            remote_url TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // commit_hash is unique per repository; the dedup filter is the
    // authoritative gate, the constraint is the backstop under
    // concurrent polls.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS commits (
            id TEXT PRIMARY KEY,
            repository_id TEXT NOT NULL,
            commit_hash TEXT NOT NULL,
            message TEXT NOT NULL,
            author_name TEXT NOT NULL,
            author_avatar TEXT,
            authored_at TEXT NOT NULL,
            summary TEXT NOT NULL,
            UNIQUE(repository_id, commit_hash),
            FOREIGN KEY (repository_id) REFERENCES repositories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_commits_repository_id ON commits(repository_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_commits_authored_at ON commits(authored_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
