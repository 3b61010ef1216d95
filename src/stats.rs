//! Vault statistics and health overview.
//!
//! Summarises what is stored and learned: session and tab counts, files in
//! the vault and quarantine, and the state of the semantic index. Used by
//! `tabvault stats`.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use walkdir::WalkDir;

use tabvault_core::SemanticIndex;

use crate::archive::{REASON_SUFFIX, TEMP_PREFIX};
use crate::config::Config;
use crate::observer::Observer;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct VaultStats {
    pub sessions: i64,
    pub tabs: i64,
    pub vault_files: usize,
    pub quarantined: usize,
    pub vocabulary: usize,
    pub documents: u64,
    pub missions: usize,
    pub feedback_records: usize,
}

/// Count regular files under `root`, skipping in-flight temps and, for
/// quarantine, reason sidecars.
pub fn count_files(root: &Path) -> usize {
    if !root.exists() {
        return 0;
    }
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name().to_string_lossy();
            !name.starts_with(TEMP_PREFIX) && !name.ends_with(REASON_SUFFIX)
        })
        .count()
}

pub fn index_stats(stats: &mut VaultStats, index: &SemanticIndex) {
    stats.vocabulary = index.vocabulary().len();
    stats.documents = index.documents();
    stats.missions = index.missions().len();
    stats.feedback_records = index.feedback_history().len();
}

/// Run the stats command: gather counts and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let mut stats = VaultStats {
        sessions: store.count_sessions().await?,
        tabs: store.count_tabs().await?,
        vault_files: count_files(&config.paths.vault),
        quarantined: count_files(&config.paths.quarantine),
        ..VaultStats::default()
    };
    store.close().await;

    let observer = Observer::from_config(config)?;
    index_stats(&mut stats, observer.index());

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("tabvault - Vault Stats");
    println!("======================");
    println!();
    println!("  Database:     {}", config.db.path.display());
    println!("  Size:         {}", format_bytes(db_size));
    println!();
    println!("  Sessions:     {}", stats.sessions);
    println!("  Tabs:         {}", stats.tabs);
    println!("  Vault files:  {}", stats.vault_files);
    println!("  Quarantined:  {}", stats.quarantined);
    println!();
    println!("  Vocabulary:   {}", stats.vocabulary);
    println!("  Documents:    {}", stats.documents);
    println!("  Missions:     {}", stats.missions);
    println!("  Feedback:     {}", stats.feedback_records);
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_count_files_skips_temps_and_sidecars() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a_session.json"), b"x").unwrap();
        std::fs::write(tmp.path().join("a_session.json.reason.json"), b"{}").unwrap();
        std::fs::write(tmp.path().join(".tmp-123"), b"x").unwrap();
        assert_eq!(count_files(tmp.path()), 1);
        assert_eq!(count_files(&tmp.path().join("missing")), 0);
    }
}
