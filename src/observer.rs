//! Observer: feeds archived sessions into the semantic index.
//!
//! The observer owns the [`SemanticIndex`] and its checkpoint file. A batch
//! moves through the phases
//!
//! ```text
//! Idle → Collecting → Vectorizing → ScoringMissions
//!      → ComputingCoOccurrence → Checkpointing → Idle
//! ```
//!
//! and the checkpoint is rewritten at the end of every non-empty batch and
//! after every mission or feedback mutation. A session whose text has no
//! tokens is logged and skipped; it never aborts the batch.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use tabvault_core::checkpoint::{self, CheckpointError};
use tabvault_core::cooccur::{CooccurrenceGraph, CooccurrenceKey};
use tabvault_core::feedback::FeedbackRecord;
use tabvault_core::mission::MissionPrototype;
use tabvault_core::models::{session_document_key, ArchivedEntry, ContentDigest};
use tabvault_core::rank::{mission_scores, rank, rank_missions, MissionMatch};
use tabvault_core::store::{MetadataStore, SessionSummary, StoredSession};
use tabvault_core::vectorize::DocumentVector;
use tabvault_core::{IndexError, SemanticIndex};

use crate::archive::StagedFile;
use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Collecting,
    Vectorizing,
    ScoringMissions,
    ComputingCoOccurrence,
    Checkpointing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Collecting => "collecting",
            Phase::Vectorizing => "vectorizing",
            Phase::ScoringMissions => "scoring-missions",
            Phase::ComputingCoOccurrence => "computing-co-occurrence",
            Phase::Checkpointing => "checkpointing",
        };
        f.write_str(s)
    }
}

/// Mission scores for one observed session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionScore {
    pub digest: ContentDigest,
    pub path: PathBuf,
    pub best: Option<MissionMatch>,
    pub missions: Vec<MissionMatch>,
}

#[derive(Debug)]
pub struct BatchReport {
    pub observed: usize,
    pub skipped: usize,
    pub scores: Vec<SessionScore>,
    pub graph: CooccurrenceGraph,
    pub checkpoint_saved: bool,
}

pub struct Observer {
    index: SemanticIndex,
    checkpoint: PathBuf,
    graph_key: CooccurrenceKey,
    phase: Phase,
}

impl Observer {
    /// Load the index from `checkpoint`, or start empty when the file does
    /// not exist. A checkpoint that exists but does not load is an error.
    pub fn open(checkpoint: &Path, feedback_rate: f64, graph_key: CooccurrenceKey) -> Result<Self> {
        let mut index = match std::fs::read(checkpoint) {
            Ok(bytes) => checkpoint::restore(&bytes).map_err(|e| match e {
                CheckpointError::Corrupt(msg) => anyhow::anyhow!(
                    "checkpoint {} is corrupt: {}",
                    checkpoint.display(),
                    msg
                ),
                other => other.into(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SemanticIndex::new(),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read checkpoint {}", checkpoint.display())
                })
            }
        };
        index.set_feedback_rate(feedback_rate);
        debug!(
            checkpoint = %checkpoint.display(),
            vocabulary = index.vocabulary().len(),
            documents = index.documents(),
            "index loaded"
        );

        Ok(Self {
            index,
            checkpoint: checkpoint.to_path_buf(),
            graph_key,
            phase: Phase::Idle,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::open(
            &config.index.checkpoint,
            config.index.feedback_rate,
            config.graph.key,
        )
    }

    pub fn index(&self) -> &SemanticIndex {
        &self.index
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = %self.phase, to = %phase, "observer phase");
        self.phase = phase;
    }

    /// Write the checkpoint atomically, replacing the previous one.
    pub fn save(&self) -> Result<()> {
        let bytes = checkpoint::encode(&self.index.save())?;
        StagedFile::stage(&self.checkpoint, &bytes)
            .and_then(StagedFile::replace)
            .with_context(|| format!("Failed to write checkpoint {}", self.checkpoint.display()))
    }

    /// Vectorize, score and aggregate one batch of archived sessions.
    pub fn observe_batch(&mut self, entries: &[ArchivedEntry]) -> Result<BatchReport> {
        self.enter(Phase::Collecting);
        let mut report = BatchReport {
            observed: 0,
            skipped: 0,
            scores: Vec::with_capacity(entries.len()),
            graph: CooccurrenceGraph::new(self.graph_key),
            checkpoint_saved: false,
        };
        if entries.is_empty() {
            self.enter(Phase::Idle);
            return Ok(report);
        }

        self.enter(Phase::Vectorizing);
        let mut vectors: Vec<(&ArchivedEntry, DocumentVector)> = Vec::with_capacity(entries.len());
        for entry in entries {
            match self
                .index
                .vectorize_document(&entry.document_key(), &entry.record.text())
            {
                Ok(v) => vectors.push((entry, v)),
                Err(IndexError::EmptyDocument(_)) => {
                    warn!(digest = %entry.digest.short(12), "session has no text; skipped");
                    report.skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        report.observed = vectors.len();

        self.enter(Phase::ScoringMissions);
        let missions = self.index.missions();
        for (entry, vector) in &vectors {
            let best = rank_missions(vector, missions);
            if let Some(m) = &best {
                debug!(digest = %entry.digest.short(12), mission = %m.name, score = m.score, "mission match");
            }
            report.scores.push(SessionScore {
                digest: entry.digest,
                path: entry.path.clone(),
                best,
                missions: mission_scores(vector, missions),
            });
        }

        self.enter(Phase::ComputingCoOccurrence);
        for entry in entries {
            report.graph.add_session(&entry.record);
        }

        self.enter(Phase::Checkpointing);
        let saved = self.save();
        self.enter(Phase::Idle);
        saved?;
        report.checkpoint_saved = true;

        info!(
            observed = report.observed,
            skipped = report.skipped,
            vocabulary = self.index.vocabulary().len(),
            documents = self.index.documents(),
            "batch observed"
        );
        Ok(report)
    }

    /// Re-score stored sessions ingested at or after `since` (all when
    /// `None`). Sessions already in the corpus are not counted again.
    pub async fn observe_stored<S>(
        &mut self,
        store: &S,
        since: Option<DateTime<Utc>>,
    ) -> Result<BatchReport>
    where
        S: MetadataStore + ?Sized,
    {
        let entries: Vec<ArchivedEntry> = store
            .list_sessions(since)
            .await?
            .into_iter()
            .map(stored_to_entry)
            .collect();
        self.observe_batch(&entries)
    }

    /// Stored sessions ranked by cosine similarity to `query`.
    ///
    /// Sessions outside the corpus are weighed like queries so ranking never
    /// changes corpus statistics.
    pub async fn similar<S>(
        &mut self,
        store: &S,
        query: &str,
        limit: usize,
    ) -> Result<Vec<(SessionSummary, f64)>>
    where
        S: MetadataStore + ?Sized,
    {
        let query_vec = self.index.vectorize_query(query);
        if query_vec.is_empty() {
            return Ok(Vec::new());
        }

        let sessions = store.list_sessions(None).await?;
        let mut candidates: Vec<(usize, DocumentVector)> = Vec::with_capacity(sessions.len());
        for (i, session) in sessions.iter().enumerate() {
            let key = session_document_key(&session.digest);
            let text = session.record.text();
            let vector = if self.index.has_contributed(&key) {
                self.index.vectorize_document(&key, &text)?
            } else {
                self.index.vectorize_query(&text)
            };
            candidates.push((i, vector));
        }

        Ok(rank(&query_vec, &candidates)
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .take(limit)
            .map(|(i, score)| (sessions[i].summary(), score))
            .collect())
    }

    pub fn add_mission(&mut self, name: &str, description: &str) -> Result<MissionPrototype> {
        let mission = self.index.add_mission(name, description)?.clone();
        self.save()?;
        info!(mission = %mission.name, "mission registered");
        Ok(mission)
    }

    /// Record relevance feedback for `session` and persist it.
    pub fn add_feedback(&mut self, session: &str, relevance: f64, terms: Vec<String>) -> Result<()> {
        self.index
            .apply_feedback(FeedbackRecord::new(session, relevance, terms))?;
        self.save()?;
        info!(session, relevance, "feedback applied");
        Ok(())
    }
}

pub fn stored_to_entry(session: StoredSession) -> ArchivedEntry {
    ArchivedEntry {
        digest: session.digest,
        path: session.path,
        arrived_at: session.ingested_at,
        record: session.record,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabvault_core::models::{SessionRecord, Tab};
    use tabvault_core::validate::digest;

    fn entry(seed: &str, tabs: &[(&str, &str)]) -> ArchivedEntry {
        ArchivedEntry {
            digest: digest(seed.as_bytes()),
            path: PathBuf::from(format!("vault/{}", seed)),
            arrived_at: Utc::now(),
            record: SessionRecord::new(tabs.iter().map(|(t, u)| Tab::new(*t, *u)).collect()),
        }
    }

    #[test]
    fn test_batch_scores_and_saves() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cp = tmp.path().join("index.json");
        let mut observer = Observer::open(&cp, 0.1, CooccurrenceKey::Url).unwrap();
        observer.add_mission("research", "academic papers").unwrap();

        let report = observer
            .observe_batch(&[
                entry("a", &[("academic research paper", "https://arxiv.org")]),
                entry("b", &[("", "")]),
            ])
            .unwrap();
        assert_eq!(report.observed, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.checkpoint_saved);
        assert_eq!(report.scores[0].best.as_ref().unwrap().name, "research");
        assert_eq!(observer.phase(), Phase::Idle);

        let reopened = Observer::open(&cp, 0.1, CooccurrenceKey::Url).unwrap();
        assert_eq!(reopened.index(), observer.index());
    }

    #[test]
    fn test_empty_batch_does_not_write_checkpoint() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cp = tmp.path().join("index.json");
        let mut observer = Observer::open(&cp, 0.1, CooccurrenceKey::Url).unwrap();
        let report = observer.observe_batch(&[]).unwrap();
        assert!(!report.checkpoint_saved);
        assert!(!cp.exists());
    }

    #[test]
    fn test_corrupt_checkpoint_is_fatal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cp = tmp.path().join("index.json");
        std::fs::write(&cp, b"{\"version\": 1}").unwrap();
        let err = Observer::open(&cp, 0.1, CooccurrenceKey::Url).err().unwrap();
        assert!(err.to_string().contains("corrupt"));
    }

    #[test]
    fn test_feedback_without_terms_is_recorded() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("cp.json");
        let mut observer = Observer::open(&path, 0.1, CooccurrenceKey::Url).unwrap();
        observer.add_feedback("session:1", 0.9, Vec::new()).unwrap();
        observer.add_feedback("session:1", 0.5, vec![" ".into()]).unwrap();
        assert_eq!(observer.index().feedback_history().len(), 2);
        assert!(observer.index().vocabulary().is_empty());

        observer
            .add_feedback("session:1", 1.0, vec!["python".into()])
            .unwrap();
        assert!(observer.index().weight("python").unwrap() > 1.0);

        let reopened = Observer::open(&path, 0.1, CooccurrenceKey::Url).unwrap();
        assert_eq!(reopened.index().feedback_history().len(), 3);
    }
}
