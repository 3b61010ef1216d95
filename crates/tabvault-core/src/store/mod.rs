//! Storage abstraction for session metadata.
//!
//! The [`MetadataStore`] trait covers everything the ingestion pipeline and
//! the observer need from the relational side: digest lookups for dedup,
//! recording archived sessions with their tabs, and keyword search.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{ContentDigest, SessionRecord, Tab};

/// Lightweight search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: i64,
    pub digest: ContentDigest,
    pub path: PathBuf,
    pub ingested_at: DateTime<Utc>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub tab_count: usize,
}

/// A recorded session with its full payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub id: i64,
    pub digest: ContentDigest,
    pub path: PathBuf,
    pub ingested_at: DateTime<Utc>,
    pub record: SessionRecord,
}

impl StoredSession {
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            digest: self.digest,
            path: self.path.clone(),
            ingested_at: self.ingested_at,
            title: self.record.title().map(str::to_string),
            url: self.record.url().map(str::to_string),
            tab_count: self.record.tabs.len(),
        }
    }
}

/// Metadata backend for archived sessions.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`exists`](MetadataStore::exists) | Dedup check by content digest |
/// | [`record_session`](MetadataStore::record_session) | Insert an archived session and its tabs |
/// | [`record_tabs`](MetadataStore::record_tabs) | Replace the tab rows of a session |
/// | [`search`](MetadataStore::search) | Keyword search over titles and URLs |
/// | [`get_session`](MetadataStore::get_session) | Fetch one session by id |
/// | [`list_sessions`](MetadataStore::list_sessions) | All sessions, optionally since a time |
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn exists(&self, digest: &ContentDigest) -> Result<bool>;

    /// Record an archived session together with its tab rows and return
    /// its id. Either everything is recorded or nothing is.
    ///
    /// Recording a digest that is already present fails.
    async fn record_session(
        &self,
        digest: &ContentDigest,
        path: &Path,
        ingested_at: DateTime<Utc>,
        record: &SessionRecord,
    ) -> Result<i64>;

    /// Replace the tab rows of an already recorded session.
    async fn record_tabs(&self, session_id: i64, tabs: &[Tab]) -> Result<()>;

    /// Sessions whose titles or URLs contain the query terms, best first.
    async fn search(&self, query: &str, limit: i64) -> Result<Vec<SessionSummary>>;

    async fn get_session(&self, id: i64) -> Result<Option<StoredSession>>;

    /// Sessions ingested at or after `since` (all when `None`), oldest first.
    async fn list_sessions(&self, since: Option<DateTime<Utc>>) -> Result<Vec<StoredSession>>;
}
