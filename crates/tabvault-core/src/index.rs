//! The adaptive semantic index.
//!
//! [`SemanticIndex`] is the single owned object holding all learned state:
//! the vocabulary, per-position feedback weights, corpus statistics, mission
//! prototypes, and feedback history. Every indexing operation takes it
//! explicitly; checkpointing is a pure conversion to and from
//! [`CheckpointState`](crate::checkpoint::CheckpointState).
//!
//! # Corpus statistics
//!
//! `N` (documents observed) and per-token document frequency are updated
//! only the first time a given document key is vectorized. Re-vectorizing a
//! document, for example when a stored session is re-scored or ranked,
//! reuses the statistics it already contributed. Queries never touch them.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::feedback::FeedbackRecord;
use crate::mission::MissionPrototype;
use crate::vectorize::{smoothed_idf, tokenize, DocumentVector};
use crate::vocab::Vocabulary;

/// Step size for feedback weight updates.
pub const DEFAULT_FEEDBACK_RATE: f64 = 0.1;

/// Stored weight of a token no feedback has touched.
pub const NEUTRAL_WEIGHT: f64 = 1.0;

/// Floor for stored weights; keeps every effective IDF positive.
pub const MIN_WEIGHT: f64 = 1e-3;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndexError {
    #[error("document '{0}' contains no tokens")]
    EmptyDocument(String),
    #[error("relevance must be a finite number, got {0}")]
    InvalidRelevance(f64),
    #[error("mission name must not be empty")]
    EmptyMissionName,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticIndex {
    pub(crate) vocab: Vocabulary,
    pub(crate) weights: Vec<f64>,
    pub(crate) doc_freq: Vec<u64>,
    pub(crate) documents: u64,
    pub(crate) contributed: BTreeSet<String>,
    pub(crate) missions: Vec<MissionPrototype>,
    pub(crate) feedback: Vec<FeedbackRecord>,
    pub(crate) feedback_rate: f64,
}

impl Default for SemanticIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticIndex {
    pub fn new() -> Self {
        Self {
            vocab: Vocabulary::new(),
            weights: Vec::new(),
            doc_freq: Vec::new(),
            documents: 0,
            contributed: BTreeSet::new(),
            missions: Vec::new(),
            feedback: Vec::new(),
            feedback_rate: DEFAULT_FEEDBACK_RATE,
        }
    }

    pub fn feedback_rate(&self) -> f64 {
        self.feedback_rate
    }

    /// Change the feedback step size. Affects future feedback only; call
    /// [`replay_feedback`](Self::replay_feedback) to rebuild weights.
    pub fn set_feedback_rate(&mut self, rate: f64) {
        self.feedback_rate = rate;
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Number of distinct documents that contributed to corpus statistics.
    pub fn documents(&self) -> u64 {
        self.documents
    }

    pub fn missions(&self) -> &[MissionPrototype] {
        &self.missions
    }

    pub fn mission(&self, name: &str) -> Option<&MissionPrototype> {
        self.missions.iter().find(|m| m.name == name)
    }

    pub fn feedback_history(&self) -> &[FeedbackRecord] {
        &self.feedback
    }

    pub fn has_contributed(&self, document_key: &str) -> bool {
        self.contributed.contains(document_key)
    }

    pub fn document_frequency(&self, token: &str) -> u64 {
        self.vocab
            .position(token)
            .and_then(|p| self.doc_freq.get(p).copied())
            .unwrap_or(0)
    }

    /// Stored (feedback-adjusted) weight for `token`, if known.
    pub fn weight(&self, token: &str) -> Option<f64> {
        self.vocab.position(token).map(|p| self.weight_at(p))
    }

    /// Effective IDF for `token` under the current corpus statistics.
    pub fn idf(&self, token: &str) -> Option<f64> {
        self.vocab.position(token).map(|p| self.idf_at(p))
    }

    pub(crate) fn weight_at(&self, position: usize) -> f64 {
        self.weights.get(position).copied().unwrap_or(NEUTRAL_WEIGHT)
    }

    pub(crate) fn idf_at(&self, position: usize) -> f64 {
        let df = self.doc_freq.get(position).copied().unwrap_or(0);
        smoothed_idf(self.documents, df) * self.weight_at(position)
    }

    /// Position for `token`, growing the vocabulary and the per-position
    /// tables with neutral entries when unseen.
    pub(crate) fn intern(&mut self, token: &str) -> usize {
        let pos = self.vocab.intern(token);
        let len = self.vocab.len();
        if self.weights.len() < len {
            self.weights.resize(len, NEUTRAL_WEIGHT);
        }
        if self.doc_freq.len() < len {
            self.doc_freq.resize(len, 0);
        }
        pos
    }

    /// Vectorize a document identified by `document_key`.
    ///
    /// The first call for a key adds the document to corpus statistics
    /// before weighting; later calls for the same key only re-weight.
    ///
    /// # Errors
    ///
    /// [`IndexError::EmptyDocument`] when `text` has no tokens. Nothing is
    /// recorded in that case.
    pub fn vectorize_document(
        &mut self,
        document_key: &str,
        text: &str,
    ) -> Result<DocumentVector, IndexError> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(IndexError::EmptyDocument(document_key.to_string()));
        }

        let counts = self.count_positions(&tokens);

        if self.contributed.insert(document_key.to_string()) {
            self.documents += 1;
            for &pos in counts.keys() {
                self.doc_freq[pos] += 1;
            }
        }

        Ok(self.weigh(&counts, tokens.len()))
    }

    /// Vectorize ad-hoc query text. Grows the vocabulary but leaves corpus
    /// statistics untouched. Empty text yields an empty vector.
    pub fn vectorize_query(&mut self, text: &str) -> DocumentVector {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return DocumentVector::new(self.vocab.len(), Vec::new());
        }
        let counts = self.count_positions(&tokens);
        self.weigh(&counts, tokens.len())
    }

    fn count_positions(&mut self, tokens: &[String]) -> BTreeMap<usize, u32> {
        let mut counts = BTreeMap::new();
        for token in tokens {
            let pos = self.intern(token);
            *counts.entry(pos).or_insert(0) += 1;
        }
        counts
    }

    fn weigh(&self, counts: &BTreeMap<usize, u32>, total: usize) -> DocumentVector {
        let total = total as f64;
        let entries = counts
            .iter()
            .map(|(&pos, &count)| (pos, (count as f64 / total) * self.idf_at(pos)))
            .collect();
        DocumentVector::new(self.vocab.len(), entries)
    }
}
