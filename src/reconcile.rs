//! Maintenance pass over the vault.
//!
//! Brings the metadata store and the index back in line with what is on
//! disk after a crash between steps:
//!
//! - archived payloads whose digest the store does not know are validated,
//!   recorded (arrival time taken from their stamp directory) and observed;
//! - stored sessions the index never saw are observed;
//! - with `prune_temp`, orphaned `.tmp-*` files under `vault/` and
//!   `quarantine/` are deleted.
//!
//! A payload is recognised by its digest matching the prefix in its stamp
//! directory name; companions and stray files are ignored.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use tabvault_core::models::ArchivedEntry;
use tabvault_core::store::MetadataStore;
use tabvault_core::validate::{digest, validate};

use crate::archive::{parse_stamp, record_entry, ArchiveWriter, TEMP_PREFIX};
use crate::config::Config;
use crate::observer::{stored_to_entry, Observer};
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Archived payloads found in the vault.
    pub scanned: usize,
    /// Payloads newly recorded in the metadata store.
    pub recorded: usize,
    /// Payloads in the vault that no longer validate.
    pub invalid: usize,
    /// Sessions fed to the observer.
    pub observed: usize,
    pub pruned: usize,
}

fn is_temp(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with(TEMP_PREFIX))
        .unwrap_or(false)
}

fn files_under(root: &Path) -> Vec<PathBuf> {
    if !root.exists() {
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| match e {
            Ok(e) => Some(e),
            Err(err) => {
                warn!(error = %err, "skipping unreadable vault entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Delete orphaned temp files under `root`. Returns how many were removed.
pub fn prune_temps(root: &Path) -> usize {
    let mut pruned = 0;
    for path in files_under(root).into_iter().filter(|p| is_temp(p)) {
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "removed orphaned temp file");
                pruned += 1;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove temp file"),
        }
    }
    pruned
}

pub async fn reconcile<S>(
    writer: &ArchiveWriter,
    store: &S,
    observer: &mut Observer,
    prune_temp: bool,
) -> Result<ReconcileReport>
where
    S: MetadataStore + ?Sized,
{
    let mut report = ReconcileReport::default();

    if prune_temp {
        report.pruned += prune_temps(writer.vault_dir());
        report.pruned += prune_temps(writer.quarantine_dir());
    }

    let mut batch: Vec<ArchivedEntry> = Vec::new();

    for path in files_under(writer.vault_dir()) {
        if is_temp(&path) {
            continue;
        }
        let Some(stamp_dir) = path.parent().and_then(|p| p.file_name()) else {
            continue;
        };
        let stamp_dir = stamp_dir.to_string_lossy().into_owned();
        let Some((arrived_at, prefix)) = parse_stamp(&stamp_dir) else {
            continue;
        };

        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read archived file");
                continue;
            }
        };
        let digest = digest(&bytes);
        if digest.short(prefix.len()) != prefix {
            continue;
        }
        report.scanned += 1;

        if store.exists(&digest).await? {
            continue;
        }

        let record = match validate(&bytes) {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "archived payload no longer validates");
                report.invalid += 1;
                continue;
            }
        };

        let entry = ArchivedEntry {
            digest,
            path,
            arrived_at,
            record,
        };
        let id = record_entry(store, &entry).await?;
        info!(id, path = %entry.path.display(), "recorded unindexed archive entry");
        report.recorded += 1;
        batch.push(entry);
    }

    // Sessions in the store that never reached the index.
    let recorded: Vec<_> = batch.iter().map(|e| e.digest).collect();
    for session in store.list_sessions(None).await? {
        let entry = stored_to_entry(session);
        if !recorded.contains(&entry.digest) && !observer.index().has_contributed(&entry.document_key()) {
            batch.push(entry);
        }
    }

    let observed = observer.observe_batch(&batch)?;
    report.observed = observed.observed;

    Ok(report)
}

pub async fn run_reconcile(config: &Config, prune_temp: bool) -> Result<()> {
    let writer = ArchiveWriter::from_config(config);
    let mut observer = Observer::from_config(config)?;
    let store = SqliteStore::open(config).await?;
    let report = reconcile(&writer, &store, &mut observer, prune_temp).await?;
    store.close().await;

    println!("reconcile");
    println!("  scanned: {}", report.scanned);
    println!("  recorded: {}", report.recorded);
    println!("  invalid: {}", report.invalid);
    println!("  observed: {}", report.observed);
    if prune_temp {
        println!("  pruned temps: {}", report.pruned);
    }
    println!("ok");
    Ok(())
}
