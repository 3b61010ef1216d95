//! Inbox sweep.
//!
//! One sweep consumes every inbox file matching `ingest.pattern`, in file
//! name order. Each item ends up archived, skipped as a duplicate, or
//! quarantined, and is then removed from the inbox. Items that hit a write
//! failure are counted as errored and left in place for the next sweep.
//! A metadata store failure aborts the sweep.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use globset::{Glob, GlobMatcher};
use serde::Serialize;
use tracing::{info, warn};

use tabvault_core::models::{ArchivedEntry, QuarantinedEntry};
use tabvault_core::store::MetadataStore;
use tabvault_core::validate::{digest, validate};

use crate::archive::{ArchiveError, ArchiveOutcome, ArchiveWriter};
use crate::config::Config;
use crate::observer::Observer;
use crate::sqlite_store::SqliteStore;
use crate::watch::run_cycle;

/// Per-sweep counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub processed: usize,
    pub duplicates: usize,
    pub quarantined: usize,
    pub errored: usize,
}

impl IngestStats {
    pub fn total(&self) -> usize {
        self.processed + self.duplicates + self.quarantined + self.errored
    }

    pub fn merge(&mut self, other: &IngestStats) {
        self.processed += other.processed;
        self.duplicates += other.duplicates;
        self.quarantined += other.quarantined;
        self.errored += other.errored;
    }
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub stats: IngestStats,
    /// Newly archived entries, in the order they were processed.
    pub archived: Vec<ArchivedEntry>,
    pub quarantined: Vec<QuarantinedEntry>,
}

pub struct Ingestor {
    inbox: PathBuf,
    matcher: GlobMatcher,
    companion_suffix: String,
    writer: ArchiveWriter,
}

impl Ingestor {
    pub fn new(
        inbox: impl Into<PathBuf>,
        writer: ArchiveWriter,
        pattern: &str,
        companion_suffix: impl Into<String>,
    ) -> Result<Self> {
        let matcher = Glob::new(pattern)
            .with_context(|| format!("Invalid ingest pattern '{}'", pattern))?
            .compile_matcher();
        Ok(Self {
            inbox: inbox.into(),
            matcher,
            companion_suffix: companion_suffix.into(),
            writer,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.paths.inbox,
            ArchiveWriter::from_config(config),
            &config.ingest.pattern,
            config.ingest.companion_suffix.clone(),
        )
    }

    pub fn inbox(&self) -> &Path {
        &self.inbox
    }

    pub fn writer(&self) -> &ArchiveWriter {
        &self.writer
    }

    /// Inbox files matching the pattern, sorted by name. A missing inbox
    /// has nothing pending.
    pub fn pending(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.inbox) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read inbox {}", self.inbox.display()))
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter(|e| self.matcher.is_match(Path::new(&e.file_name())))
            .map(|e| e.path())
            .collect();
        files.sort();
        Ok(files)
    }

    /// Inbox path of the companion attachment for `session_file`.
    pub fn companion_for(&self, session_file: &Path) -> Option<PathBuf> {
        let stem = session_file.file_stem()?.to_string_lossy();
        Some(
            session_file
                .with_file_name(format!("{}{}", stem, self.companion_suffix)),
        )
    }

    /// Process every pending inbox item once.
    pub async fn sweep<S>(&self, store: &S) -> Result<SweepReport>
    where
        S: MetadataStore + ?Sized,
    {
        let mut report = SweepReport::default();
        for path in self.pending()? {
            self.ingest_file(store, &path, &mut report).await?;
        }
        if report.stats.total() > 0 {
            info!(
                processed = report.stats.processed,
                duplicates = report.stats.duplicates,
                quarantined = report.stats.quarantined,
                errored = report.stats.errored,
                "sweep finished"
            );
        }
        Ok(report)
    }

    async fn ingest_file<S>(&self, store: &S, path: &Path, report: &mut SweepReport) -> Result<()>
    where
        S: MetadataStore + ?Sized,
    {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                warn!(file = %file_name, error = %e, "failed to read inbox item");
                report.stats.errored += 1;
                return Ok(());
            }
        };
        let digest = digest(&bytes);
        let now = Utc::now();

        let record = match validate(&bytes) {
            Ok(record) => record,
            Err(invalid) => {
                match self.writer.quarantine(&bytes, &file_name, &invalid, now) {
                    Ok(entry) => {
                        remove_from_inbox(path);
                        report.stats.quarantined += 1;
                        report.quarantined.push(entry);
                    }
                    Err(e) => {
                        warn!(file = %file_name, error = %e, "failed to quarantine inbox item");
                        report.stats.errored += 1;
                    }
                }
                return Ok(());
            }
        };

        match self
            .writer
            .archive(store, digest, record, &bytes, &file_name, now)
            .await
        {
            Ok(ArchiveOutcome::Archived(entry)) => {
                self.take_companion(path, &entry);
                remove_from_inbox(path);
                report.stats.processed += 1;
                report.archived.push(entry);
            }
            Ok(ArchiveOutcome::AlreadyExists(_)) => {
                info!(file = %file_name, digest = %digest.short(12), "duplicate skipped");
                remove_from_inbox(path);
                report.stats.duplicates += 1;
            }
            Err(ArchiveError::StorageWriteFailure { path: target, source }) => {
                warn!(
                    file = %file_name,
                    target = %target.display(),
                    error = %source,
                    "archive write failed; item left in inbox"
                );
                report.stats.errored += 1;
            }
            Err(ArchiveError::Store(e)) => {
                return Err(e.context(format!("metadata store failed while ingesting {}", file_name)));
            }
        }
        Ok(())
    }

    fn take_companion(&self, session_file: &Path, entry: &ArchivedEntry) {
        let Some(companion) = self.companion_for(session_file) else {
            return;
        };
        if !companion.is_file() {
            return;
        }
        let name = companion
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let archived = fs::read(&companion)
            .map_err(ArchiveError::from_io(&companion))
            .and_then(|bytes| self.writer.archive_companion(entry, &name, &bytes));
        match archived {
            Ok(_) => remove_from_inbox(&companion),
            Err(e) => warn!(file = %name, error = %e, "failed to archive companion; left in inbox"),
        }
    }
}

/// Run the ingest command: one sweep plus observation of what it archived.
pub async fn run_ingest(config: &Config) -> Result<()> {
    let ingestor = Ingestor::from_config(config)?;
    let mut observer = Observer::from_config(config)?;
    let store = SqliteStore::open(config).await?;
    let cycle = run_cycle(&ingestor, &store, &mut observer).await?;
    store.close().await;

    let s = cycle.sweep.stats;
    println!("ingest {}", ingestor.inbox().display());
    println!("  processed: {}", s.processed);
    println!("  duplicates: {}", s.duplicates);
    println!("  quarantined: {}", s.quarantined);
    println!("  errored: {}", s.errored);
    if cycle.batch.observed > 0 {
        println!("  observed: {}", cycle.batch.observed);
    }
    println!("ok");
    Ok(())
}

fn remove_from_inbox(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(file = %path.display(), error = %e, "failed to remove inbox item");
    }
}
