//! Cosine-similarity ranking over [`DocumentVector`]s.

use serde::Serialize;

use crate::mission::MissionPrototype;
use crate::vectorize::DocumentVector;

/// Cosine similarity of `a` and `b` after zero-extending both to the longer
/// extent.
///
/// Returns a value in `[-1.0, 1.0]`, and exactly `0.0` when either vector has
/// zero magnitude.
pub fn cosine_similarity(a: &DocumentVector, b: &DocumentVector) -> f64 {
    let mag_a = a.magnitude();
    let mag_b = b.magnitude();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    let sim = a.dot(b) / (mag_a * mag_b);
    if sim.is_finite() {
        sim.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Score every candidate against `query` and sort by score, descending.
///
/// Ties keep their input order.
pub fn rank<I: Clone>(query: &DocumentVector, candidates: &[(I, DocumentVector)]) -> Vec<(I, f64)> {
    let mut scored: Vec<(I, f64)> = candidates
        .iter()
        .map(|(id, vec)| (id.clone(), cosine_similarity(query, vec)))
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored
}

/// Best-matching mission for a session vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionMatch {
    pub name: String,
    pub score: f64,
}

/// Highest-scoring mission, or `None` when no mission is registered.
///
/// On equal scores the earliest-registered mission wins.
pub fn rank_missions(vector: &DocumentVector, missions: &[MissionPrototype]) -> Option<MissionMatch> {
    let mut best: Option<MissionMatch> = None;
    for mission in missions {
        let score = cosine_similarity(vector, &mission.vector);
        match &best {
            Some(b) if b.score >= score => {}
            _ => {
                best = Some(MissionMatch {
                    name: mission.name.clone(),
                    score,
                })
            }
        }
    }
    best
}

/// Score against every mission, in registration order.
pub fn mission_scores(vector: &DocumentVector, missions: &[MissionPrototype]) -> Vec<MissionMatch> {
    missions
        .iter()
        .map(|m| MissionMatch {
            name: m.name.clone(),
            score: cosine_similarity(vector, &m.vector),
        })
        .collect()
}
