//! Relevance feedback.
//!
//! A [`FeedbackRecord`] nudges the stored weight of each listed term by a
//! factor of `1 + rate × (2 × relevance − 1)`: relevance `1.0` reinforces,
//! `0.0` dampens, `0.5` leaves weights unchanged. Records are kept in full
//! so weights can be rebuilt with [`SemanticIndex::replay_feedback`].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::index::{IndexError, SemanticIndex, MIN_WEIGHT, NEUTRAL_WEIGHT};
use crate::vectorize::tokenize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// Identifier of the session the feedback refers to.
    pub session: String,
    /// Relevance in `[0.0, 1.0]`.
    pub relevance: f64,
    pub terms: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn new(session: impl Into<String>, relevance: f64, terms: Vec<String>) -> Self {
        Self {
            session: session.into(),
            relevance,
            terms,
            recorded_at: Utc::now(),
        }
    }
}

impl SemanticIndex {
    /// Adjust term weights and append `record` to the history.
    ///
    /// Relevance is clamped to `[0, 1]`. Unknown terms join the vocabulary
    /// with neutral weight first. The record is kept even when it lists no
    /// usable terms.
    ///
    /// # Errors
    ///
    /// [`IndexError::InvalidRelevance`] for NaN or infinite relevance; the
    /// index is left untouched.
    pub fn apply_feedback(&mut self, mut record: FeedbackRecord) -> Result<(), IndexError> {
        if !record.relevance.is_finite() {
            return Err(IndexError::InvalidRelevance(record.relevance));
        }
        record.relevance = record.relevance.clamp(0.0, 1.0);
        self.adjust_weights(&record);
        self.feedback.push(record);
        Ok(())
    }

    /// Reset every weight to neutral and re-apply the whole history with the
    /// current feedback rate.
    pub fn replay_feedback(&mut self) {
        self.weights.iter_mut().for_each(|w| *w = NEUTRAL_WEIGHT);
        let history = std::mem::take(&mut self.feedback);
        for record in &history {
            self.adjust_weights(record);
        }
        self.feedback = history;
    }

    fn adjust_weights(&mut self, record: &FeedbackRecord) {
        let factor = 1.0 + self.feedback_rate * (2.0 * record.relevance - 1.0);
        let positions: BTreeSet<usize> = record
            .terms
            .iter()
            .flat_map(|term| tokenize(term))
            .map(|token| self.intern(&token))
            .collect();
        for pos in positions {
            let w = &mut self.weights[pos];
            *w = (*w * factor).max(MIN_WEIGHT);
        }
    }
}
