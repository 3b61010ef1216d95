//! Append-only token vocabulary.
//!
//! Tokens live in an arena indexed by insertion order, with a separate map
//! from token to position. A position is assigned once and never changes or
//! gets reused, so vectors created under a smaller vocabulary stay valid as
//! the vocabulary grows.

use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vocabulary {
    tokens: Vec<String>,
    positions: HashMap<String, usize>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from tokens ordered by position.
    ///
    /// Returns the offending token if it appears twice.
    pub fn from_tokens(tokens: Vec<String>) -> Result<Self, String> {
        let mut positions = HashMap::with_capacity(tokens.len());
        for (pos, token) in tokens.iter().enumerate() {
            if positions.insert(token.clone(), pos).is_some() {
                return Err(token.clone());
            }
        }
        Ok(Self { tokens, positions })
    }

    /// Position of `token`, assigning the next free one if unseen.
    pub fn intern(&mut self, token: &str) -> usize {
        if let Some(&pos) = self.positions.get(token) {
            return pos;
        }
        let pos = self.tokens.len();
        self.tokens.push(token.to_string());
        self.positions.insert(token.to_string(), pos);
        pos
    }

    pub fn position(&self, token: &str) -> Option<usize> {
        self.positions.get(token).copied()
    }

    pub fn token(&self, position: usize) -> Option<&str> {
        self.tokens.get(position).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// `(position, token)` pairs in position order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.tokens.iter().enumerate().map(|(i, t)| (i, t.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_assigns_stable_positions() {
        let mut v = Vocabulary::new();
        assert_eq!(v.intern("alpha"), 0);
        assert_eq!(v.intern("beta"), 1);
        assert_eq!(v.intern("alpha"), 0);
        assert_eq!(v.intern("gamma"), 2);
        assert_eq!(v.len(), 3);
        assert_eq!(v.token(1), Some("beta"));
        assert_eq!(v.position("gamma"), Some(2));
        assert_eq!(v.position("delta"), None);
    }

    #[test]
    fn test_from_tokens_rejects_duplicates() {
        assert!(Vocabulary::from_tokens(vec!["a".into(), "b".into()]).is_ok());
        assert_eq!(
            Vocabulary::from_tokens(vec!["a".into(), "a".into()]),
            Err("a".to_string())
        );
    }

    #[test]
    fn test_growth_after_rebuild_continues_positions() {
        let mut v = Vocabulary::from_tokens(vec!["x".into(), "y".into()]).unwrap();
        assert_eq!(v.intern("z"), 2);
        assert_eq!(v.iter().map(|(_, t)| t).collect::<Vec<_>>(), ["x", "y", "z"]);
    }
}
