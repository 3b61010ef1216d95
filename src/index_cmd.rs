//! Commands that read or mutate the semantic index: `observe`,
//! `add-mission`, `missions` and `feedback`.

use anyhow::{bail, Result};
use chrono::{Duration, Utc};

use tabvault_core::models::session_document_key;
use tabvault_core::store::MetadataStore;
use tabvault_core::vectorize::tokenize;

use crate::config::Config;
use crate::observer::{BatchReport, Observer};
use crate::sqlite_store::SqliteStore;

/// Re-observe stored sessions, optionally only those from the last
/// `since_days` days.
pub async fn run_observe(config: &Config, since_days: Option<u32>) -> Result<()> {
    let mut observer = Observer::from_config(config)?;
    let store = SqliteStore::open(config).await?;
    let since = since_days.map(|d| Utc::now() - Duration::days(d as i64));
    let report = observer.observe_stored(&store, since).await?;
    store.close().await;

    print_batch(&report);
    Ok(())
}

pub fn print_batch(report: &BatchReport) {
    println!("observe");
    println!("  sessions observed: {}", report.observed);
    println!("  skipped (no text): {}", report.skipped);
    println!(
        "  co-occurrence: {} nodes, {} edges",
        report.graph.node_count(),
        report.graph.edge_count()
    );
    for score in &report.scores {
        match &score.best {
            Some(m) => println!(
                "  {}  {} ({:.3})",
                score.digest.short(12),
                m.name,
                m.score
            ),
            None => println!("  {}  -", score.digest.short(12)),
        }
    }
}

pub fn run_add_mission(config: &Config, name: &str, description: &str) -> Result<()> {
    let mut observer = Observer::from_config(config)?;
    let mission = observer.add_mission(name, description)?;
    println!("Mission '{}' saved.", mission.name);
    Ok(())
}

pub fn run_missions(config: &Config) -> Result<()> {
    let observer = Observer::from_config(config)?;
    let missions = observer.index().missions();
    if missions.is_empty() {
        println!("No missions.");
        return Ok(());
    }
    for m in missions {
        println!("{:<20} {}", m.name, m.description);
    }
    Ok(())
}

/// Record relevance feedback for stored session `session_id`.
///
/// Without explicit `terms`, the session's own title and URL tokens are
/// used.
pub async fn run_feedback(
    config: &Config,
    session_id: i64,
    score: f64,
    terms: Option<Vec<String>>,
) -> Result<()> {
    if !score.is_finite() {
        bail!("score must be a finite number");
    }

    let store = SqliteStore::open(config).await?;
    let session = store.get_session(session_id).await?;
    store.close().await;
    let Some(session) = session else {
        bail!("No session with id {}", session_id);
    };

    let terms = match terms {
        Some(t) if !t.is_empty() => t,
        _ => {
            let mut tokens = tokenize(&session.record.text());
            tokens.sort();
            tokens.dedup();
            tokens
        }
    };

    let mut observer = Observer::from_config(config)?;
    let key = session_document_key(&session.digest);
    observer.add_feedback(&key, score, terms)?;
    println!("Feedback recorded for session {}.", session_id);
    Ok(())
}
