//! In-memory [`MetadataStore`] implementation for tests.
//!
//! Sessions live in a `Vec` behind `std::sync::RwLock`; ids are assigned
//! sequentially from 1. Keyword search matches query tokens against each
//! session's tab titles and URLs and ranks by the number of matching terms.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{ContentDigest, SessionRecord, Tab};
use crate::vectorize::tokenize;

use super::{MetadataStore, SessionSummary, StoredSession};

#[derive(Default)]
struct Tables {
    sessions: Vec<StoredSession>,
    tabs: HashMap<i64, Vec<Tab>>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tab rows recorded for `session_id`.
    pub fn tab_count(&self, session_id: i64) -> usize {
        self.read()
            .map(|t| t.tabs.get(&session_id).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| anyhow!("metadata store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| anyhow!("metadata store lock poisoned"))
    }
}

#[async_trait]
impl MetadataStore for InMemoryStore {
    async fn exists(&self, digest: &ContentDigest) -> Result<bool> {
        Ok(self.read()?.sessions.iter().any(|s| &s.digest == digest))
    }

    async fn record_session(
        &self,
        digest: &ContentDigest,
        path: &Path,
        ingested_at: DateTime<Utc>,
        record: &SessionRecord,
    ) -> Result<i64> {
        let mut tables = self.write()?;
        if tables.sessions.iter().any(|s| &s.digest == digest) {
            bail!("session {} already recorded", digest.short(12));
        }
        let id = tables.sessions.len() as i64 + 1;
        tables.sessions.push(StoredSession {
            id,
            digest: *digest,
            path: path.to_path_buf(),
            ingested_at,
            record: record.clone(),
        });
        tables.tabs.insert(id, record.tabs.clone());
        Ok(id)
    }

    async fn record_tabs(&self, session_id: i64, tabs: &[Tab]) -> Result<()> {
        let mut tables = self.write()?;
        if !tables.sessions.iter().any(|s| s.id == session_id) {
            bail!("unknown session id {}", session_id);
        }
        tables.tabs.insert(session_id, tabs.to_vec());
        Ok(())
    }

    async fn search(&self, query: &str, limit: i64) -> Result<Vec<SessionSummary>> {
        let terms = tokenize(query);
        if terms.is_empty() || limit <= 0 {
            return Ok(Vec::new());
        }
        let tables = self.read()?;
        let mut hits: Vec<(usize, SessionSummary)> = tables
            .sessions
            .iter()
            .filter_map(|s| {
                let text = s.record.text().to_lowercase();
                let matches = terms.iter().filter(|t| text.contains(t.as_str())).count();
                (matches > 0).then(|| (matches, s.summary()))
            })
            .collect();
        hits.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(hits
            .into_iter()
            .take(limit as usize)
            .map(|(_, s)| s)
            .collect())
    }

    async fn get_session(&self, id: i64) -> Result<Option<StoredSession>> {
        Ok(self.read()?.sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn list_sessions(&self, since: Option<DateTime<Utc>>) -> Result<Vec<StoredSession>> {
        let tables = self.read()?;
        let mut sessions: Vec<StoredSession> = tables
            .sessions
            .iter()
            .filter(|s| since.map_or(true, |t| s.ingested_at >= t))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| (s.ingested_at, s.id));
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::digest;
    use chrono::Duration;

    fn record(title: &str, url: &str) -> SessionRecord {
        SessionRecord::new(vec![Tab::new(title, url)])
    }

    #[tokio::test]
    async fn test_record_and_exists() {
        let store = InMemoryStore::new();
        let d = digest(b"one");
        assert!(!store.exists(&d).await.unwrap());
        let rec = record("Rust book", "https://doc.rust-lang.org/book");
        let id = store
            .record_session(&d, Path::new("vault/x"), Utc::now(), &rec)
            .await
            .unwrap();
        assert!(store.exists(&d).await.unwrap());
        assert_eq!(store.tab_count(id), 1);

        let more = vec![Tab::new("a", "https://a.example"), Tab::new("b", "https://b.example")];
        store.record_tabs(id, &more).await.unwrap();
        assert_eq!(store.tab_count(id), 2);
        assert!(store.record_tabs(id + 1, &more).await.is_err());

        let again = store
            .record_session(&d, Path::new("vault/y"), Utc::now(), &rec)
            .await;
        assert!(again.is_err());

        let stored = store.get_session(id).await.unwrap().unwrap();
        assert_eq!(stored.record, rec);
        assert!(store.get_session(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_ranks_by_matching_terms() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .record_session(&digest(b"a"), Path::new("a"), now, &record("Rust async", "https://tokio.rs"))
            .await
            .unwrap();
        store
            .record_session(&digest(b"b"), Path::new("b"), now, &record("Rust book", "https://rust-lang.org"))
            .await
            .unwrap();
        store
            .record_session(&digest(b"c"), Path::new("c"), now, &record("Cooking", "https://food.example"))
            .await
            .unwrap();

        let hits = store.search("rust tokio", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title.as_deref(), Some("Rust async"));
        assert_eq!(store.search("rust", 1).await.unwrap().len(), 1);
        assert!(store.search("  ", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_sessions_since() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let old = now - Duration::days(10);
        store
            .record_session(&digest(b"new"), Path::new("n"), now, &record("n", "n"))
            .await
            .unwrap();
        store
            .record_session(&digest(b"old"), Path::new("o"), old, &record("o", "o"))
            .await
            .unwrap();

        let all = store.list_sessions(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].ingested_at, old);

        let recent = store
            .list_sessions(Some(now - Duration::days(1)))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].digest, digest(b"new"));
    }
}
