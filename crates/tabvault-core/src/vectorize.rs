//! Tokenization and sparse document vectors.
//!
//! A [`DocumentVector`] stores only its non-zero `(position, weight)` pairs
//! plus the vocabulary extent at creation time. Every position at or beyond
//! the extent is implicitly zero, so two vectors created under different
//! vocabulary sizes compare as if the shorter one were zero-extended.

use serde::{Deserialize, Serialize};

/// Lowercase `text` and split it on every non-alphanumeric character,
/// dropping empty pieces.
///
/// ```rust
/// use tabvault_core::vectorize::tokenize;
///
/// assert_eq!(
///     tokenize("Intro to Rust https://rust-lang.org"),
///     ["intro", "to", "rust", "https", "rust", "lang", "org"]
/// );
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Smoothed inverse document frequency: `ln((N + 1) / (df + 1)) + 1`.
///
/// Always `>= 1` when `df <= N`, and finite for an empty corpus.
pub fn smoothed_idf(documents: u64, document_frequency: u64) -> f64 {
    ((documents as f64 + 1.0) / (document_frequency as f64 + 1.0)).ln() + 1.0
}

/// Sparse weighted vector over vocabulary positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentVector {
    extent: usize,
    entries: Vec<(usize, f64)>,
}

impl DocumentVector {
    /// Build from arbitrary `(position, weight)` pairs.
    ///
    /// Pairs are sorted by position; zero weights are dropped. The extent is
    /// raised to cover the largest position if needed.
    pub fn new(extent: usize, mut entries: Vec<(usize, f64)>) -> Self {
        entries.retain(|(_, w)| *w != 0.0);
        entries.sort_by_key(|(pos, _)| *pos);
        entries.dedup_by_key(|(pos, _)| *pos);
        let extent = entries
            .last()
            .map(|(pos, _)| extent.max(pos + 1))
            .unwrap_or(extent);
        Self { extent, entries }
    }

    /// Vocabulary size when the vector was created.
    pub fn extent(&self) -> usize {
        self.extent
    }

    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, position: usize) -> f64 {
        self.entries
            .binary_search_by_key(&position, |(pos, _)| *pos)
            .map(|i| self.entries[i].1)
            .unwrap_or(0.0)
    }

    pub fn magnitude(&self) -> f64 {
        self.entries.iter().map(|(_, w)| w * w).sum::<f64>().sqrt()
    }

    /// Dot product; positions missing on either side count as zero.
    pub fn dot(&self, other: &DocumentVector) -> f64 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.entries.len() && j < other.entries.len() {
            let (pa, wa) = self.entries[i];
            let (pb, wb) = other.entries[j];
            match pa.cmp(&pb) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += wa * wb;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }

    /// Dense form zero-extended to `len` (at least the vector's extent).
    pub fn to_dense(&self, len: usize) -> Vec<f64> {
        let mut dense = vec![0.0; len.max(self.extent)];
        for &(pos, w) in &self.entries {
            dense[pos] = w;
        }
        dense
    }
}
