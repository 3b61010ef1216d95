//! SQLite-backed [`MetadataStore`] implementation.
//!
//! Sessions are rows in `sessions` (unique `digest`), tabs are rows in
//! `tabs`, and the session text (tab titles and URLs) is mirrored into the
//! FTS5 table `sessions_fts` for keyword search. All three are written in
//! one transaction. Timestamps are stored as Unix microseconds.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use tabvault_core::models::{ContentDigest, SessionRecord, Tab};
use tabvault_core::store::{MetadataStore, SessionSummary, StoredSession};
use tabvault_core::vectorize::tokenize;

use crate::config::Config;
use crate::{db, migrate};

/// SQLite implementation of the [`MetadataStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database, creating the schema if needed.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    pub async fn count_sessions(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn count_tabs(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM tabs")
            .fetch_one(&self.pool)
            .await?)
    }
}

/// Turn free text into an FTS5 expression: every token double-quoted and
/// OR-ed, so punctuation in the query can never be read as FTS syntax.
pub fn fts_query(query: &str) -> Option<String> {
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return None;
    }
    Some(
        tokens
            .iter()
            .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

fn micros_to_datetime(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| anyhow!("timestamp {} out of range", micros))
}

fn row_to_summary(row: &SqliteRow) -> Result<SessionSummary> {
    let digest: String = row.get("digest");
    let path: String = row.get("path");
    let tab_count: i64 = row.get("tab_count");
    Ok(SessionSummary {
        id: row.get("id"),
        digest: digest.parse()?,
        path: PathBuf::from(path),
        ingested_at: micros_to_datetime(row.get("ingested_at"))?,
        title: row.get("title"),
        url: row.get("url"),
        tab_count: tab_count as usize,
    })
}

fn row_to_session(row: &SqliteRow) -> Result<StoredSession> {
    let id: i64 = row.get("id");
    let digest: String = row.get("digest");
    let path: String = row.get("path");
    let record_json: String = row.get("record_json");
    let record: SessionRecord = serde_json::from_str(&record_json)
        .with_context(|| format!("stored record for session {} is unreadable", id))?;
    Ok(StoredSession {
        id,
        digest: digest.parse()?,
        path: PathBuf::from(path),
        ingested_at: micros_to_datetime(row.get("ingested_at"))?,
        record,
    })
}

async fn insert_tabs(tx: &mut Transaction<'_, Sqlite>, session_id: i64, tabs: &[Tab]) -> Result<()> {
    for (i, tab) in tabs.iter().enumerate() {
        sqlx::query("INSERT INTO tabs (session_id, position, title, url) VALUES (?, ?, ?, ?)")
            .bind(session_id)
            .bind(i as i64)
            .bind(&tab.title)
            .bind(&tab.url)
            .execute(&mut **tx)
            .await
            .with_context(|| format!("failed to record tabs for session {}", session_id))?;
    }
    Ok(())
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn exists(&self, digest: &ContentDigest) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM sessions WHERE digest = ?")
            .bind(digest.to_hex())
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn record_session(
        &self,
        digest: &ContentDigest,
        path: &Path,
        ingested_at: DateTime<Utc>,
        record: &SessionRecord,
    ) -> Result<i64> {
        let record_json = serde_json::to_string(record)?;
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sessions (digest, path, ingested_at, title, url, tab_count, record_json)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(digest.to_hex())
        .bind(path.to_string_lossy().into_owned())
        .bind(ingested_at.timestamp_micros())
        .bind(record.title())
        .bind(record.url())
        .bind(record.tabs.len() as i64)
        .bind(&record_json)
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("failed to record session {}", digest.short(12)))?;

        sqlx::query("INSERT INTO sessions_fts (session_id, text) VALUES (?, ?)")
            .bind(id)
            .bind(record.text())
            .execute(&mut *tx)
            .await?;

        insert_tabs(&mut tx, id, &record.tabs).await?;

        tx.commit().await?;
        Ok(id)
    }

    async fn record_tabs(&self, session_id: i64, tabs: &[Tab]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM tabs WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        insert_tabs(&mut tx, session_id, tabs).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, query: &str, limit: i64) -> Result<Vec<SessionSummary>> {
        let Some(expr) = fts_query(query) else {
            return Ok(Vec::new());
        };
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT s.id, s.digest, s.path, s.ingested_at, s.title, s.url, s.tab_count
            FROM sessions_fts
            JOIN sessions s ON s.id = sessions_fts.session_id
            WHERE sessions_fts MATCH ?
            ORDER BY sessions_fts.rank, s.id
            LIMIT ?
            "#,
        )
        .bind(&expr)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_summary).collect()
    }

    async fn get_session(&self, id: i64) -> Result<Option<StoredSession>> {
        let row = sqlx::query(
            "SELECT id, digest, path, ingested_at, record_json FROM sessions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_session).transpose()
    }

    async fn list_sessions(&self, since: Option<DateTime<Utc>>) -> Result<Vec<StoredSession>> {
        let since = since.map(|t| t.timestamp_micros()).unwrap_or(i64::MIN);
        let rows = sqlx::query(
            r#"
            SELECT id, digest, path, ingested_at, record_json
            FROM sessions
            WHERE ingested_at >= ?
            ORDER BY ingested_at ASC, id ASC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_session).collect()
    }
}
