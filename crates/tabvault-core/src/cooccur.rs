//! URL co-occurrence aggregation.
//!
//! Two keys gain one unit of weight for every session in which both appear.
//! Each key counts once per session no matter how many tabs share it. The
//! relation is symmetric and derived on demand; it is not part of the index
//! checkpoint.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::models::SessionRecord;

/// What identifies a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CooccurrenceKey {
    /// The full tab URL.
    #[default]
    Url,
    /// The URL's host (`https://docs.rs/tokio` → `docs.rs`).
    Host,
}

impl CooccurrenceKey {
    /// Node key for `url`, or `None` if it has no usable form.
    pub fn extract(&self, url: &str) -> Option<String> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }
        match self {
            CooccurrenceKey::Url => Some(url.to_string()),
            CooccurrenceKey::Host => {
                let rest = url.split_once("://")?.1;
                let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
                let host = authority.rsplit('@').next().unwrap_or("");
                if host.is_empty() {
                    None
                } else {
                    Some(host.to_lowercase())
                }
            }
        }
    }
}

/// Single undirected edge, emitted with `source < target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub weight: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CooccurrenceGraph {
    key: CooccurrenceKey,
    nodes: BTreeSet<String>,
    weights: BTreeMap<(String, String), u64>,
}

impl CooccurrenceGraph {
    pub fn new(key: CooccurrenceKey) -> Self {
        Self {
            key,
            ..Self::default()
        }
    }

    pub fn from_sessions<'a>(
        key: CooccurrenceKey,
        sessions: impl IntoIterator<Item = &'a SessionRecord>,
    ) -> Self {
        let mut graph = Self::new(key);
        for session in sessions {
            graph.add_session(session);
        }
        graph
    }

    pub fn add_session(&mut self, session: &SessionRecord) {
        let keys: BTreeSet<String> = session
            .urls()
            .filter_map(|u| self.key.extract(u))
            .collect();
        let keys: Vec<String> = keys.into_iter().collect();
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                *self.weights.entry((a.clone(), b.clone())).or_insert(0) += 1;
            }
        }
        self.nodes.extend(keys);
    }

    /// Number of sessions in which both `a` and `b` appear.
    pub fn weight(&self, a: &str, b: &str) -> u64 {
        let pair = if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        };
        self.weights.get(&pair).copied().unwrap_or(0)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.weights.len()
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.weights
            .iter()
            .map(|((a, b), w)| Edge {
                source: a.clone(),
                target: b.clone(),
                weight: *w,
            })
            .collect()
    }
}
