//! Checkpoint serialization for [`SemanticIndex`].
//!
//! [`SemanticIndex::save`] and [`SemanticIndex::load`] are pure conversions
//! to and from [`CheckpointState`]; [`encode`] and [`decode`] turn that
//! state into pretty-printed JSON and back. Writing the bytes to disk is the
//! application's job.
//!
//! # Layout
//!
//! ```text
//! {
//!   "version": 1,
//!   "vocabulary": { "<token>": <position>, ... },
//!   "weights":    { "<position>": <weight>, ... },
//!   "missions":   [ { "name", "description", "vector" }, ... ],
//!   "feedback":   [ { "session", "relevance", "terms", "recorded_at" }, ... ],
//!   "corpus":     { "documents", "document_frequency", "contributed" }
//! }
//! ```
//!
//! Every section is required. Weight and document-frequency tables may be
//! shorter than the vocabulary; missing positions load as neutral weight and
//! zero frequency.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::feedback::FeedbackRecord;
use crate::index::{SemanticIndex, NEUTRAL_WEIGHT};
use crate::mission::MissionPrototype;
use crate::vocab::Vocabulary;

pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint corrupt: {0}")]
    Corrupt(String),
    #[error("checkpoint could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

fn corrupt(msg: impl Into<String>) -> CheckpointError {
    CheckpointError::Corrupt(msg.into())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusStats {
    pub documents: u64,
    pub document_frequency: BTreeMap<usize, u64>,
    pub contributed: BTreeSet<String>,
}

/// Serializable snapshot of all learned index state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub version: u32,
    pub vocabulary: BTreeMap<String, usize>,
    pub weights: BTreeMap<usize, f64>,
    pub missions: Vec<MissionPrototype>,
    pub feedback: Vec<FeedbackRecord>,
    pub corpus: CorpusStats,
}

impl SemanticIndex {
    /// Snapshot the full index state.
    pub fn save(&self) -> CheckpointState {
        CheckpointState {
            version: CHECKPOINT_VERSION,
            vocabulary: self
                .vocab
                .iter()
                .map(|(pos, token)| (token.to_string(), pos))
                .collect(),
            weights: self.weights.iter().copied().enumerate().collect(),
            missions: self.missions.clone(),
            feedback: self.feedback.clone(),
            corpus: CorpusStats {
                documents: self.documents,
                document_frequency: self
                    .doc_freq
                    .iter()
                    .copied()
                    .enumerate()
                    .filter(|(_, df)| *df > 0)
                    .collect(),
                contributed: self.contributed.clone(),
            },
        }
    }

    /// Rebuild an index from a snapshot, checking every section.
    ///
    /// The feedback rate is not part of the snapshot; the loaded index uses
    /// [`DEFAULT_FEEDBACK_RATE`](crate::index::DEFAULT_FEEDBACK_RATE) until
    /// the caller sets another.
    pub fn load(state: CheckpointState) -> Result<Self, CheckpointError> {
        if state.version != CHECKPOINT_VERSION {
            return Err(corrupt(format!(
                "unsupported version {} (expected {})",
                state.version, CHECKPOINT_VERSION
            )));
        }

        let len = state.vocabulary.len();
        let mut tokens: Vec<Option<String>> = vec![None; len];
        for (token, pos) in state.vocabulary {
            let slot = tokens.get_mut(pos).ok_or_else(|| {
                corrupt(format!(
                    "vocabulary position {} out of range for {} tokens",
                    pos, len
                ))
            })?;
            if slot.is_some() {
                return Err(corrupt(format!("vocabulary position {} assigned twice", pos)));
            }
            *slot = Some(token);
        }
        // `len` distinct positions below `len` with no repeats fill every slot.
        let tokens: Vec<String> = tokens.into_iter().flatten().collect();
        let vocab = Vocabulary::from_tokens(tokens)
            .map_err(|t| corrupt(format!("duplicate token '{}'", t)))?;

        let mut weights = vec![NEUTRAL_WEIGHT; len];
        for (pos, w) in state.weights {
            if pos >= len {
                return Err(corrupt(format!("weight for unknown position {}", pos)));
            }
            if !w.is_finite() || w < 0.0 {
                return Err(corrupt(format!("invalid weight {} at position {}", w, pos)));
            }
            weights[pos] = w;
        }

        let mut doc_freq = vec![0u64; len];
        for (pos, df) in state.corpus.document_frequency {
            if pos >= len {
                return Err(corrupt(format!(
                    "document frequency for unknown position {}",
                    pos
                )));
            }
            if df > state.corpus.documents {
                return Err(corrupt(format!(
                    "document frequency {} exceeds document count {}",
                    df, state.corpus.documents
                )));
            }
            doc_freq[pos] = df;
        }

        let mut seen = BTreeSet::new();
        for mission in &state.missions {
            if !seen.insert(mission.name.as_str()) {
                return Err(corrupt(format!("mission '{}' listed twice", mission.name)));
            }
            let v = &mission.vector;
            if v.extent() > len || v.entries().iter().any(|(p, _)| *p >= v.extent()) {
                return Err(corrupt(format!(
                    "mission '{}' references positions beyond the vocabulary",
                    mission.name
                )));
            }
        }

        Ok(Self {
            vocab,
            weights,
            doc_freq,
            documents: state.corpus.documents,
            contributed: state.corpus.contributed,
            missions: state.missions,
            feedback: state.feedback,
            feedback_rate: crate::index::DEFAULT_FEEDBACK_RATE,
        })
    }
}

/// Serialize a snapshot as pretty-printed JSON.
pub fn encode(state: &CheckpointState) -> Result<Vec<u8>, CheckpointError> {
    Ok(serde_json::to_vec_pretty(state)?)
}

/// Parse a snapshot. Any syntax error or missing section is reported as
/// [`CheckpointError::Corrupt`].
pub fn decode(bytes: &[u8]) -> Result<CheckpointState, CheckpointError> {
    serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))
}

/// Decode and load in one step.
pub fn restore(bytes: &[u8]) -> Result<SemanticIndex, CheckpointError> {
    SemanticIndex::load(decode(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::FeedbackRecord;
    use crate::rank::{rank, rank_missions};
    use crate::vectorize::DocumentVector;

    fn populated() -> SemanticIndex {
        let mut index = SemanticIndex::new();
        index
            .vectorize_document("session:a", "rust async runtime tokio")
            .unwrap();
        index
            .vectorize_document("session:b", "python pandas data frames")
            .unwrap();
        index.add_mission("research", "academic papers").unwrap();
        index.add_mission("coding", "rust python programming").unwrap();
        index
            .apply_feedback(FeedbackRecord::new(
                "session:a",
                0.9,
                vec!["rust".into(), "unseen".into()],
            ))
            .unwrap();
        index
            .apply_feedback(FeedbackRecord::new("session:b", 0.2, vec!["pandas".into()]))
            .unwrap();
        index
    }

    fn rankings(index: &mut SemanticIndex) -> Vec<Vec<(usize, f64)>> {
        let queries = ["rust tokio", "python data", "academic research paper", "zzz"];
        let docs = [
            "rust async runtime tokio",
            "python pandas data frames",
            "academic papers on rust",
        ];
        let candidates: Vec<(usize, DocumentVector)> = docs
            .iter()
            .enumerate()
            .map(|(i, d)| (i, index.vectorize_query(d)))
            .collect();
        queries
            .iter()
            .map(|q| {
                let qv = index.vectorize_query(q);
                rank(&qv, &candidates)
            })
            .collect()
    }

    #[test]
    fn test_load_save_is_identity() {
        let index = populated();
        let restored = SemanticIndex::load(index.save()).unwrap();
        assert_eq!(restored, index);
    }

    #[test]
    fn test_encoded_roundtrip_reproduces_rankings() {
        let mut original = populated();
        let bytes = encode(&original.save()).unwrap();
        let mut restored = restore(&bytes).unwrap();
        assert_eq!(restored, original);

        assert_eq!(rankings(&mut restored), rankings(&mut original));

        let session = original.vectorize_query("academic research");
        assert_eq!(
            rank_missions(&session, restored.missions()),
            rank_missions(&session, original.missions())
        );
    }

    #[test]
    fn test_restored_index_keeps_growing() {
        let index = populated();
        let before = index.vocabulary().len();
        let mut restored = SemanticIndex::load(index.save()).unwrap();
        restored
            .vectorize_document("session:c", "brand new words")
            .unwrap();
        assert_eq!(restored.vocabulary().len(), before + 3);
        assert_eq!(restored.vocabulary().position("rust"), index.vocabulary().position("rust"));
        // No double counting for already-contributed documents.
        restored
            .vectorize_document("session:a", "rust async runtime tokio")
            .unwrap();
        assert_eq!(restored.documents(), index.documents() + 1);
    }

    #[test]
    fn test_short_tables_load_as_neutral() {
        let mut state = populated().save();
        let last = state.vocabulary.len() - 1;
        state.weights.remove(&last);
        let index = SemanticIndex::load(state).unwrap();
        let token = index.vocabulary().token(last).unwrap().to_string();
        assert_eq!(index.weight(&token), Some(NEUTRAL_WEIGHT));
    }

    #[test]
    fn test_missing_section_is_corrupt() {
        let mut value = serde_json::to_value(populated().save()).unwrap();
        value.as_object_mut().unwrap().remove("missions");
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(matches!(decode(&bytes), Err(CheckpointError::Corrupt(_))));
        assert!(matches!(decode(b"not json"), Err(CheckpointError::Corrupt(_))));
    }

    #[test]
    fn test_inconsistent_sections_are_corrupt() {
        let mut gap = populated().save();
        gap.vocabulary.insert("gap".into(), 999);
        assert!(matches!(SemanticIndex::load(gap), Err(CheckpointError::Corrupt(_))));

        let mut twice = populated().save();
        twice.vocabulary.insert("again".into(), 0);
        assert!(SemanticIndex::load(twice).is_err());

        let mut negative = populated().save();
        negative.weights.insert(0, -1.0);
        assert!(SemanticIndex::load(negative).is_err());

        let mut stray = populated().save();
        stray.weights.insert(10_000, 1.0);
        assert!(SemanticIndex::load(stray).is_err());

        let mut version = populated().save();
        version.version = 99;
        assert!(SemanticIndex::load(version).is_err());

        let mut mission = populated().save();
        mission.missions[0].vector = DocumentVector::new(10_000, vec![(9_999, 1.0)]);
        assert!(SemanticIndex::load(mission).is_err());
    }

    #[test]
    fn test_empty_index_roundtrip() {
        let index = SemanticIndex::new();
        let restored = restore(&encode(&index.save()).unwrap()).unwrap();
        assert_eq!(restored, index);
    }
}
