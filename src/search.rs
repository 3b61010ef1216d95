//! `search` and `similar` commands.
//!
//! `search` is keyword search through the metadata store's full-text index.
//! `similar` ranks stored sessions by cosine similarity to the query under
//! the semantic index.

use anyhow::Result;

use tabvault_core::store::{MetadataStore, SessionSummary};

use crate::config::Config;
use crate::observer::Observer;
use crate::sqlite_store::SqliteStore;

pub async fn run_search(config: &Config, query: &str, limit: i64) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let store = SqliteStore::open(config).await?;
    let results = store.search(query, limit).await?;
    store.close().await;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, s) in results.iter().enumerate() {
        print_summary(i + 1, s, None);
    }
    Ok(())
}

pub async fn run_similar(config: &Config, query: &str, limit: usize) -> Result<()> {
    let mut observer = Observer::from_config(config)?;
    let store = SqliteStore::open(config).await?;
    let results = observer.similar(&store, query, limit).await?;
    store.close().await;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, (s, score)) in results.iter().enumerate() {
        print_summary(i + 1, s, Some(*score));
    }
    Ok(())
}

fn print_summary(rank: usize, s: &SessionSummary, score: Option<f64>) {
    match score {
        Some(score) => println!(
            "{}. [{}] {} (score: {:.3})",
            rank,
            s.id,
            s.title.as_deref().unwrap_or("Untitled"),
            score
        ),
        None => println!(
            "{}. [{}] {}",
            rank,
            s.id,
            s.title.as_deref().unwrap_or("Untitled")
        ),
    }
    println!("   url: {}", s.url.as_deref().unwrap_or("n/a"));
    println!("   tabs: {}", s.tab_count);
    println!("   ingested: {}", s.ingested_at.format("%Y-%m-%d %H:%M:%S"));
    println!("   path: {}", s.path.display());
    println!("   digest: {}", s.digest.short(12));
    println!();
}
