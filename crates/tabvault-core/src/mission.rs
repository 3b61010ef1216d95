//! Mission prototypes: named reference vectors used to classify sessions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::index::{IndexError, SemanticIndex};
use crate::vectorize::{tokenize, DocumentVector};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionPrototype {
    pub name: String,
    pub description: String,
    pub vector: DocumentVector,
}

/// Document key under which a mission description joins corpus statistics.
pub fn mission_document_key(name: &str) -> String {
    format!("mission:{}", name)
}

impl SemanticIndex {
    /// Register or replace the mission `name`.
    ///
    /// The description is vectorized as a document, so it counts towards
    /// corpus statistics once per mission name. Replacing a mission keeps its
    /// registration order and swaps the old description's document
    /// frequencies for the new one's; `N` is unchanged.
    pub fn add_mission(
        &mut self,
        name: &str,
        description: &str,
    ) -> Result<&MissionPrototype, IndexError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(IndexError::EmptyMissionName);
        }
        let key = mission_document_key(name);
        let tokens = tokenize(description);
        if tokens.is_empty() {
            return Err(IndexError::EmptyDocument(key));
        }

        let replaced: Option<BTreeSet<usize>> = self.mission(name).map(|old| {
            tokenize(&old.description)
                .iter()
                .filter_map(|t| self.vocab.position(t))
                .collect()
        });
        if let Some(old_positions) = replaced.filter(|_| self.contributed.contains(&key)) {
            for pos in old_positions {
                if let Some(df) = self.doc_freq.get_mut(pos) {
                    *df = df.saturating_sub(1);
                }
            }
            let new_positions: BTreeSet<usize> = tokens.iter().map(|t| self.intern(t)).collect();
            for pos in new_positions {
                self.doc_freq[pos] += 1;
            }
        }

        let vector = self.vectorize_document(&key, description)?;
        let prototype = MissionPrototype {
            name: name.to_string(),
            description: description.to_string(),
            vector,
        };

        let idx = match self.missions.iter().position(|m| m.name == name) {
            Some(idx) => {
                self.missions[idx] = prototype;
                idx
            }
            None => {
                self.missions.push(prototype);
                self.missions.len() - 1
            }
        };
        Ok(&self.missions[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::rank_missions;

    #[test]
    fn test_mission_matches_related_session() {
        let mut index = SemanticIndex::new();
        index.add_mission("research", "academic papers").unwrap();
        let session = index
            .vectorize_document("session:1", "academic research paper")
            .unwrap();
        let best = rank_missions(&session, index.missions()).unwrap();
        assert_eq!(best.name, "research");
        assert!(best.score > 0.0);
    }

    #[test]
    fn test_readding_overwrites_in_place() {
        let mut index = SemanticIndex::new();
        index.add_mission("coding", "software development").unwrap();
        index.add_mission("cooking", "recipes kitchen").unwrap();
        index.add_mission("coding", "rust programming").unwrap();
        assert_eq!(index.missions().len(), 2);
        assert_eq!(index.missions()[0].name, "coding");
        assert_eq!(index.missions()[0].description, "rust programming");
        assert_eq!(index.documents(), 2);
    }

    #[test]
    fn test_readding_moves_document_frequency_to_new_description() {
        let mut index = SemanticIndex::new();
        index.vectorize_document("session:1", "rust development").unwrap();
        index.add_mission("coding", "software development").unwrap();
        assert_eq!(index.document_frequency("development"), 2);

        index.add_mission("coding", "rust programming").unwrap();
        assert_eq!(index.documents(), 2);
        assert_eq!(index.document_frequency("software"), 0);
        assert_eq!(index.document_frequency("development"), 1);
        assert_eq!(index.document_frequency("rust"), 2);
        assert_eq!(index.document_frequency("programming"), 1);

        // Re-adding the same text is a no-op for corpus statistics.
        index.add_mission("coding", "rust programming").unwrap();
        assert_eq!(index.document_frequency("rust"), 2);
        assert_eq!(index.document_frequency("programming"), 1);
    }

    #[test]
    fn test_failed_readd_keeps_previous_mission() {
        let mut index = SemanticIndex::new();
        index.add_mission("coding", "software development").unwrap();
        assert!(index.add_mission("coding", "...").is_err());
        assert_eq!(index.mission("coding").unwrap().description, "software development");
        assert_eq!(index.document_frequency("software"), 1);
    }

    #[test]
    fn test_invalid_missions_are_rejected() {
        let mut index = SemanticIndex::new();
        assert_eq!(
            index.add_mission("  ", "text").unwrap_err(),
            IndexError::EmptyMissionName
        );
        assert!(matches!(
            index.add_mission("empty", "!!!"),
            Err(IndexError::EmptyDocument(_))
        ));
        assert!(index.missions().is_empty());
    }
}
