//! Core data models for the commit ingestion pipeline.
//!
//! These types represent repositories, the commit descriptors fetched from
//! the version-control API, and the persisted commit rows that flow through
//! ingestion and enrichment.

use chrono::{DateTime, Utc};

/// Sentinel stored in the summary column at ingestion time, before the
/// background enrichment pass has produced a real summary.
pub const SUMMARY_PENDING: &str = "Processing summary...";

/// Sentinel stored when enrichment failed terminally for this poll cycle.
/// Failed rows are not re-enriched by later polls; deduplication is keyed
/// on hash existence alone, which bounds API spend.
pub const SUMMARY_FAILED: &str = "Summary generation failed";

/// A tracked repository. Immutable after registration as far as this
/// pipeline is concerned.
#[derive(Debug, Clone)]
pub struct Repository {
    pub id: String,
    pub name: String,
    pub remote_url: String,
    pub created_at: DateTime<Utc>,
}

/// A commit as fetched from the version-control API, before persistence.
#[derive(Debug, Clone)]
pub struct CommitDescriptor {
    /// Content-addressed hash; the deduplication key within a repository.
    pub hash: String,
    pub message: String,
    pub author_name: String,
    pub author_avatar: Option<String>,
    /// Authored timestamp as reported upstream (RFC 3339), kept verbatim.
    pub authored_at: String,
}

/// A commit row as persisted in SQLite.
#[derive(Debug, Clone)]
pub struct CommitRecord {
    pub id: String,
    pub repository_id: String,
    pub hash: String,
    pub message: String,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub authored_at: String,
    pub summary: String,
}

/// Display-level classification of a persisted summary value.
///
/// Readers see rows strictly before enrichment completes, so a summary is
/// rendered distinctly while it is still a sentinel — never a silent stall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryState {
    Pending,
    Failed,
    Ready,
}

impl SummaryState {
    pub fn of(summary: &str) -> Self {
        if summary == SUMMARY_PENDING {
            SummaryState::Pending
        } else if summary == SUMMARY_FAILED {
            SummaryState::Failed
        } else {
            SummaryState::Ready
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_state_classification() {
        assert_eq!(SummaryState::of(SUMMARY_PENDING), SummaryState::Pending);
        assert_eq!(SummaryState::of(SUMMARY_FAILED), SummaryState::Failed);
        assert_eq!(
            SummaryState::of("Added retry logic to the downloader"),
            SummaryState::Ready
        );
    }
}
