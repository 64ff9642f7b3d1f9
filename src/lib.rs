//! # Commit Scribe
//!
//! A commit ingestion and AI summarization pipeline for tracked Git
//! repositories.
//!
//! Commit Scribe polls the GitHub API for recent commits, deduplicates
//! them against previously persisted history, stores new commits
//! immediately with a pending-summary placeholder, and enriches each one
//! in the background with an AI-generated summary of its diff — paced to
//! stay inside a strict external rate limit.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌─────────────┐
//! │  Poll    │──▶│  GitHub   │──▶│  Dedup   │──▶│   SQLite     │
//! │trigger   │   │ commits   │   │ filter   │   │ (pending)    │
//! └──────────┘   └───────────┘   └──────────┘   └──────┬──────┘
//!      returns to caller ◀──────────────────────────────┘
//!                                                       │ detached
//!                                                       ▼
//!                        ┌───────────┐   ┌──────────┐   ┌──────────┐
//!                        │ diff      │──▶│ Gemini   │──▶│ summary   │
//!                        │ fetch     │   │ client   │   │ update    │
//!                        └───────────┘   └──────────┘   └──────────┘
//! ```
//!
//! The synchronous path ends at the bulk ingestion write; enrichment runs
//! detached in small sequential batches with inter-request delays.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and summary sentinels |
//! | [`error`] | Typed pipeline error taxonomy |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`store`] | Repository and commit persistence |
//! | [`github`] | Commit listing and diff fetching |
//! | [`summarize`] | Rate-limited AI summarization client |
//! | [`enrich`] | Background batch enrichment scheduler |
//! | [`poll`] | Poll orchestration and the watch loop |

pub mod config;
pub mod db;
pub mod enrich;
pub mod error;
pub mod github;
pub mod migrate;
pub mod models;
pub mod poll;
pub mod store;
pub mod summarize;
