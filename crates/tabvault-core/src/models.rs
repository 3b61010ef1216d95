//! Core data models used throughout tabvault.
//!
//! These types represent the session payloads, content digests, and archive
//! entries that flow through the ingestion and indexing pipeline.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A single browser tab inside a session snapshot.
///
/// Fields other than `title` and `url` are kept in `extra` and written back
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tab {
    pub title: String,
    pub url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Tab {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            extra: Map::new(),
        }
    }
}

/// Parsed session payload.
///
/// Only produced by [`validate`](crate::validate::validate); malformed bytes
/// never yield a `SessionRecord`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub tabs: Vec<Tab>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionRecord {
    pub fn new(tabs: Vec<Tab>) -> Self {
        Self {
            tabs,
            extra: Map::new(),
        }
    }

    /// Text fed to the vectorizer and the full-text index: every tab title
    /// and URL, in tab order, joined by single spaces.
    pub fn text(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(self.tabs.len() * 2);
        for tab in &self.tabs {
            if !tab.title.is_empty() {
                parts.push(&tab.title);
            }
            if !tab.url.is_empty() {
                parts.push(&tab.url);
            }
        }
        parts.join(" ")
    }

    /// First non-empty tab title, used as the session's display title.
    pub fn title(&self) -> Option<&str> {
        self.tabs
            .iter()
            .map(|t| t.title.as_str())
            .find(|t| !t.is_empty())
    }

    /// First non-empty tab URL.
    pub fn url(&self) -> Option<&str> {
        self.tabs
            .iter()
            .map(|t| t.url.as_str())
            .find(|u| !u.is_empty())
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.tabs
            .iter()
            .map(|t| t.url.as_str())
            .filter(|u| !u.is_empty())
    }
}

/// SHA-256 digest of raw payload bytes.
///
/// Serialized as a 64-character lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First `len` hex characters, for stamps and log lines.
    pub fn short(&self, len: usize) -> String {
        let mut s = self.to_hex();
        s.truncate(len);
        s
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.short(12))
    }
}

impl FromStr for ContentDigest {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| anyhow::anyhow!("invalid content digest '{}': {}", s, e))?;
        Ok(Self(bytes))
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A session accepted into the vault.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedEntry {
    pub digest: ContentDigest,
    /// Final path of the archived payload file.
    pub path: PathBuf,
    pub arrived_at: DateTime<Utc>,
    pub record: SessionRecord,
}

impl ArchivedEntry {
    /// Key under which this session contributes to corpus statistics.
    pub fn document_key(&self) -> String {
        session_document_key(&self.digest)
    }
}

/// Document key for a session with the given digest.
pub fn session_document_key(digest: &ContentDigest) -> String {
    format!("session:{}", digest.to_hex())
}

/// Why a payload was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    MalformedPayload,
    EncodingError,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MalformedPayload => f.write_str("MalformedPayload"),
            RejectReason::EncodingError => f.write_str("EncodingError"),
        }
    }
}

/// A rejected payload held in quarantine.
#[derive(Debug, Clone, PartialEq)]
pub struct QuarantinedEntry {
    pub digest: ContentDigest,
    pub path: PathBuf,
    pub reason: RejectReason,
    pub detail: String,
}
