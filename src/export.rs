//! Export the URL co-occurrence graph as JSON.
//!
//! ```json
//! {
//!   "nodes": ["https://a.example", "https://b.example"],
//!   "edges": [{ "source": "https://a.example", "target": "https://b.example", "weight": 2 }]
//! }
//! ```
//!
//! Each undirected edge appears once, with `source < target`.

use std::path::Path;

use anyhow::Result;
use chrono::{Duration, Utc};
use serde::Serialize;

use tabvault_core::cooccur::{CooccurrenceGraph, CooccurrenceKey, Edge};
use tabvault_core::store::MetadataStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Serialize)]
pub struct GraphExport {
    pub nodes: Vec<String>,
    pub edges: Vec<Edge>,
}

impl GraphExport {
    pub fn from_graph(graph: &CooccurrenceGraph) -> Self {
        Self {
            nodes: graph.nodes().map(str::to_string).collect(),
            edges: graph.edges(),
        }
    }
}

/// Build the graph over stored sessions from the last `window_days` days
/// (all sessions when `0`).
pub async fn build_graph<S>(
    store: &S,
    key: CooccurrenceKey,
    window_days: u32,
) -> Result<CooccurrenceGraph>
where
    S: MetadataStore + ?Sized,
{
    let since = (window_days > 0).then(|| Utc::now() - Duration::days(window_days as i64));
    let sessions = store.list_sessions(since).await?;
    Ok(CooccurrenceGraph::from_sessions(
        key,
        sessions.iter().map(|s| &s.record),
    ))
}

/// Export the co-occurrence graph.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn run_export_graph(
    config: &Config,
    output: Option<&Path>,
    since_days: Option<u32>,
) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let window = since_days.unwrap_or(config.graph.window_days);
    let graph = build_graph(&store, config.graph.key, window).await?;
    store.close().await;

    let data = GraphExport::from_graph(&graph);
    let json = serde_json::to_string_pretty(&data)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, &json)?;
            eprintln!(
                "Exported {} nodes, {} edges to {}",
                data.nodes.len(),
                data.edges.len(),
                path.display()
            );
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}
