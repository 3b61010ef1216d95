//! Crash-safe archive and quarantine writer.
//!
//! Every file lands in two steps: the bytes are written to a `.tmp-<uuid>`
//! file in the destination directory and fsynced ([`StagedFile::stage`]),
//! then hard-linked onto the final name ([`StagedFile::commit`]). A final path
//! therefore either holds the complete payload or does not exist. Temps left
//! behind by a crash are removed by `reconcile --prune-temp`.
//!
//! # Layout
//!
//! ```text
//! vault/YYYY/MM/DD/<YYYYMMDD_HHMMSS_micros>_<digest12>/<file name>
//! quarantine/<YYYYMMDD_HHMMSS_micros>_<digest12>_<file name>
//! quarantine/<YYYYMMDD_HHMMSS_micros>_<digest12>_<file name>.reason.json
//! ```
//!
//! No existing file under `vault/` or `quarantine/` is ever overwritten.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use tabvault_core::models::{
    ArchivedEntry, ContentDigest, QuarantinedEntry, RejectReason, SessionRecord,
};
use tabvault_core::store::MetadataStore;
use tabvault_core::validate::{digest, ValidationError};

use crate::config::Config;

/// Prefix of in-flight temp files.
pub const TEMP_PREFIX: &str = ".tmp-";

/// Suffix of quarantine sidecar files.
pub const REASON_SUFFIX: &str = ".reason.json";

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";
const DIGEST_PREFIX_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to write {}: {source}", .path.display())]
    StorageWriteFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl ArchiveError {
    /// Adapter for `map_err` turning an I/O error on `path` into
    /// [`ArchiveError::StorageWriteFailure`].
    pub fn from_io(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError + '_ {
        move |source| ArchiveError::StorageWriteFailure {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug)]
pub enum ArchiveOutcome {
    Archived(ArchivedEntry),
    AlreadyExists(ContentDigest),
}

/// Result of committing a staged file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    Written,
    /// The target already existed; the staged temp was removed instead.
    TargetExists,
}

/// Bytes written and fsynced to a temp file, not yet visible at `target`.
#[derive(Debug)]
pub struct StagedFile {
    temp: PathBuf,
    target: PathBuf,
}

impl StagedFile {
    pub fn stage(target: &Path, bytes: &[u8]) -> io::Result<Self> {
        let dir = target.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "target has no parent directory")
        })?;
        fs::create_dir_all(dir)?;

        let temp = dir.join(format!("{}{}", TEMP_PREFIX, Uuid::new_v4()));
        let mut file = File::create(&temp)?;
        let written = file.write_all(bytes).and_then(|_| file.sync_all());
        drop(file);
        if let Err(e) = written {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }

        Ok(Self {
            temp,
            target: target.to_path_buf(),
        })
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Publish the staged bytes under the target name unless the target
    /// already exists. The link either succeeds or fails with
    /// `AlreadyExists`, so a concurrent writer can never be clobbered.
    pub fn commit(self) -> io::Result<Commit> {
        match fs::hard_link(&self.temp, &self.target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                fs::remove_file(&self.temp)?;
                return Ok(Commit::TargetExists);
            }
            Err(e) => return Err(e),
        }
        // The target is complete at this point; a leftover temp is pruned
        // by `reconcile --prune-temp`.
        if let Err(e) = fs::remove_file(&self.temp) {
            warn!(temp = %self.temp.display(), error = %e, "failed to remove staged temp");
        }
        if let Some(dir) = self.target.parent() {
            sync_dir(dir);
        }
        Ok(Commit::Written)
    }

    /// Atomically move the staged bytes onto the target, replacing any
    /// previous version. Only for files outside `vault/` and `quarantine/`.
    pub fn replace(self) -> io::Result<()> {
        fs::rename(&self.temp, &self.target)
    }

    pub fn discard(self) -> io::Result<()> {
        fs::remove_file(&self.temp)
    }
}

fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|handle| handle.sync_all()) {
        warn!(dir = %dir.display(), error = %e, "failed to sync directory");
    }
}

/// Stage and commit in one step.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> io::Result<Commit> {
    StagedFile::stage(target, bytes)?.commit()
}

/// `<YYYYMMDD_HHMMSS_micros>_<first 12 hex of digest>`.
pub fn stamp(at: DateTime<Utc>, digest: &ContentDigest) -> String {
    format!("{}_{}", at.format(STAMP_FORMAT), digest.short(DIGEST_PREFIX_LEN))
}

/// Parse a stamp back into its timestamp and digest prefix.
pub fn parse_stamp(stamp: &str) -> Option<(DateTime<Utc>, &str)> {
    let (time, prefix) = stamp.rsplit_once('_')?;
    if prefix.len() != DIGEST_PREFIX_LEN || !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(time, STAMP_FORMAT).ok()?;
    Some((naive.and_utc(), prefix))
}

fn plain_file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "session.json".to_string())
}

/// Sidecar describing why a payload was quarantined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineSidecar {
    pub reason: RejectReason,
    pub detail: String,
    pub original_name: String,
    pub digest: ContentDigest,
    pub quarantined_at: DateTime<Utc>,
}

/// Record an archived entry and its tabs in the metadata store.
pub async fn record_entry<S>(store: &S, entry: &ArchivedEntry) -> anyhow::Result<i64>
where
    S: MetadataStore + ?Sized,
{
    store
        .record_session(&entry.digest, &entry.path, entry.arrived_at, &entry.record)
        .await
        .with_context(|| format!("failed to record session {}", entry.path.display()))
}

#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    vault: PathBuf,
    quarantine: PathBuf,
}

impl ArchiveWriter {
    pub fn new(vault: impl Into<PathBuf>, quarantine: impl Into<PathBuf>) -> Self {
        Self {
            vault: vault.into(),
            quarantine: quarantine.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.paths.vault, &config.paths.quarantine)
    }

    pub fn vault_dir(&self) -> &Path {
        &self.vault
    }

    pub fn quarantine_dir(&self) -> &Path {
        &self.quarantine
    }

    /// Directory an entry with this digest and arrival time lands in.
    pub fn partition(&self, at: DateTime<Utc>, digest: &ContentDigest) -> PathBuf {
        self.vault
            .join(at.format("%Y").to_string())
            .join(at.format("%m").to_string())
            .join(at.format("%d").to_string())
            .join(stamp(at, digest))
    }

    /// Payload already in the vault for `digest`, with the arrival time
    /// taken from its stamp directory.
    pub fn find_archived(&self, digest: &ContentDigest) -> Option<(PathBuf, DateTime<Utc>)> {
        let prefix = digest.short(DIGEST_PREFIX_LEN);
        WalkDir::new(&self.vault)
            .min_depth(4)
            .max_depth(4)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .find_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                let (arrived_at, found) = parse_stamp(&name)?;
                if found != prefix {
                    return None;
                }
                let path = fs::read_dir(e.path())
                    .ok()?
                    .filter_map(|f| f.ok())
                    .map(|f| f.path())
                    .filter(|p| p.is_file())
                    .filter(|p| {
                        !p.file_name()
                            .map(|n| n.to_string_lossy().starts_with(TEMP_PREFIX))
                            .unwrap_or(true)
                    })
                    .find(|p| {
                        fs::read(p)
                            .map(|bytes| tabvault_core::validate::digest(&bytes) == *digest)
                            .unwrap_or(false)
                    })?;
                Some((path, arrived_at))
            })
    }

    /// Archive a validated payload and record it in `store`.
    ///
    /// Returns [`ArchiveOutcome::AlreadyExists`] without touching the disk
    /// when the store already knows `digest`. A payload that reached the
    /// vault on an earlier attempt whose store write failed is recorded
    /// from its existing location instead of being written again.
    pub async fn archive<S>(
        &self,
        store: &S,
        digest: ContentDigest,
        record: SessionRecord,
        payload: &[u8],
        file_name: &str,
        arrived_at: DateTime<Utc>,
    ) -> Result<ArchiveOutcome, ArchiveError>
    where
        S: MetadataStore + ?Sized,
    {
        if store.exists(&digest).await? {
            debug!(digest = %digest.short(12), "already archived");
            return Ok(ArchiveOutcome::AlreadyExists(digest));
        }

        if let Some((path, arrived_at)) = self.find_archived(&digest) {
            let entry = ArchivedEntry {
                digest,
                path,
                arrived_at,
                record,
            };
            let id = record_entry(store, &entry).await?;
            info!(
                id,
                digest = %digest.short(12),
                path = %entry.path.display(),
                "recorded session already in vault"
            );
            return Ok(ArchiveOutcome::Archived(entry));
        }

        let path = self
            .partition(arrived_at, &digest)
            .join(plain_file_name(file_name));

        match write_atomic(&path, payload).map_err(ArchiveError::from_io(&path))? {
            Commit::Written => {}
            Commit::TargetExists => return Ok(ArchiveOutcome::AlreadyExists(digest)),
        }

        let entry = ArchivedEntry {
            digest,
            path,
            arrived_at,
            record,
        };
        let id = record_entry(store, &entry).await?;
        info!(
            id,
            digest = %digest.short(12),
            path = %entry.path.display(),
            tabs = entry.record.tabs.len(),
            "archived session"
        );
        Ok(ArchiveOutcome::Archived(entry))
    }

    /// Place a companion attachment next to an archived session.
    pub fn archive_companion(
        &self,
        entry: &ArchivedEntry,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, ArchiveError> {
        let dir = entry.path.parent().ok_or_else(|| {
            anyhow::anyhow!("archived path {} has no parent", entry.path.display())
        })?;
        let path = dir.join(plain_file_name(file_name));
        write_atomic(&path, bytes).map_err(ArchiveError::from_io(&path))?;
        debug!(path = %path.display(), "archived companion");
        Ok(path)
    }

    /// Move a rejected payload into quarantine with a reason sidecar.
    ///
    /// The sidecar is committed before the payload, so a payload in
    /// quarantine always has its reason next to it. Byte-identical content
    /// already in quarantine is reported as the existing entry.
    pub fn quarantine(
        &self,
        bytes: &[u8],
        file_name: &str,
        error: &ValidationError,
        at: DateTime<Utc>,
    ) -> Result<QuarantinedEntry, ArchiveError> {
        let digest = digest(bytes);
        if let Some(existing) = self.find_quarantined(&digest) {
            debug!(digest = %digest.short(12), "already quarantined");
            return Ok(existing);
        }

        let original_name = plain_file_name(file_name);
        let name = format!("{}_{}", stamp(at, &digest), original_name);
        let path = self.quarantine.join(&name);
        let sidecar_path = self.quarantine.join(format!("{}{}", name, REASON_SUFFIX));

        let sidecar = QuarantineSidecar {
            reason: error.reason(),
            detail: error.detail().to_string(),
            original_name,
            digest,
            quarantined_at: at,
        };
        let sidecar_bytes = serde_json::to_vec_pretty(&sidecar).map_err(anyhow::Error::from)?;

        write_atomic(&sidecar_path, &sidecar_bytes).map_err(ArchiveError::from_io(&sidecar_path))?;
        write_atomic(&path, bytes).map_err(ArchiveError::from_io(&path))?;

        info!(
            digest = %digest.short(12),
            reason = %sidecar.reason,
            path = %path.display(),
            "quarantined payload"
        );
        Ok(QuarantinedEntry {
            digest,
            path,
            reason: sidecar.reason,
            detail: sidecar.detail,
        })
    }

    /// Sidecars currently in quarantine, with the payload path each describes.
    pub fn quarantined(&self) -> Vec<(PathBuf, QuarantineSidecar)> {
        let Ok(entries) = fs::read_dir(&self.quarantine) else {
            return Vec::new();
        };
        let mut found: Vec<(PathBuf, QuarantineSidecar)> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                let payload = name.strip_suffix(REASON_SUFFIX)?.to_string();
                let bytes = fs::read(e.path()).ok()?;
                let sidecar: QuarantineSidecar = serde_json::from_slice(&bytes).ok()?;
                Some((self.quarantine.join(payload), sidecar))
            })
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        found
    }

    fn find_quarantined(&self, digest: &ContentDigest) -> Option<QuarantinedEntry> {
        self.quarantined()
            .into_iter()
            .find(|(path, s)| &s.digest == digest && path.exists())
            .map(|(path, s)| QuarantinedEntry {
                digest: s.digest,
                path,
                reason: s.reason,
                detail: s.detail,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tabvault_core::validate::validate;

    #[test]
    fn test_staged_but_uncommitted_leaves_target_absent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let target = tmp.path().join("a").join("file.json");
        let staged = StagedFile::stage(&target, b"payload").unwrap();
        assert!(!target.exists());
        assert!(staged.temp_path().exists());
        assert!(staged
            .temp_path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(TEMP_PREFIX));

        staged.commit().unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"payload");
    }

    #[test]
    fn test_commit_never_overwrites() {
        let tmp = tempfile::TempDir::new().unwrap();
        let target = tmp.path().join("file.json");
        assert_eq!(write_atomic(&target, b"first").unwrap(), Commit::Written);
        assert_eq!(write_atomic(&target, b"second").unwrap(), Commit::TargetExists);
        assert_eq!(fs::read(&target).unwrap(), b"first");
        // The losing temp is cleaned up.
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_commit_after_target_appears_keeps_existing_bytes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let target = tmp.path().join("file.json");
        let staged = StagedFile::stage(&target, b"late").unwrap();
        let temp = staged.temp_path().to_path_buf();
        fs::write(&target, b"early").unwrap();

        assert_eq!(staged.commit().unwrap(), Commit::TargetExists);
        assert_eq!(fs::read(&target).unwrap(), b"early");
        assert!(!temp.exists());
    }

    #[test]
    fn test_find_archived_matches_digest_not_prefix_alone() {
        let tmp = tempfile::TempDir::new().unwrap();
        let writer = ArchiveWriter::new(tmp.path().join("vault"), tmp.path().join("quarantine"));
        let payload = br#"{"tabs":[{"title":"a","url":"https://a.example"}]}"#;
        let d = digest(payload);
        assert!(writer.find_archived(&d).is_none());

        let at = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let dir = writer.partition(at, &d);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("x_tabs.pdf"), b"companion").unwrap();
        assert!(writer.find_archived(&d).is_none());

        fs::write(dir.join("x_session.json"), payload).unwrap();
        let (path, arrived_at) = writer.find_archived(&d).unwrap();
        assert_eq!(path, dir.join("x_session.json"));
        assert_eq!(arrived_at, at);
    }

    #[test]
    fn test_stamp_roundtrip() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
            + chrono::Duration::microseconds(123_456);
        let d = digest(b"x");
        let s = stamp(at, &d);
        assert!(s.starts_with("20240309_140507_123456_"));
        let (parsed, prefix) = parse_stamp(&s).unwrap();
        assert_eq!(parsed, at);
        assert_eq!(prefix, d.short(12));
        assert!(parse_stamp("20240309_140507").is_none());
        assert!(parse_stamp("garbage_0123456789ab").is_none());
    }

    #[test]
    fn test_partition_layout() {
        let writer = ArchiveWriter::new("/v", "/q");
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let d = digest(b"x");
        let p = writer.partition(at, &d);
        assert!(p.starts_with("/v/2024/01/02"));
        assert_eq!(
            p.file_name().unwrap().to_string_lossy(),
            format!("20240102_030405_000000_{}", d.short(12))
        );
    }

    #[test]
    fn test_quarantine_writes_sidecar_and_dedups() {
        let tmp = tempfile::TempDir::new().unwrap();
        let writer = ArchiveWriter::new(tmp.path().join("vault"), tmp.path().join("quarantine"));
        let bytes = b"{not json";
        let err = validate(bytes).unwrap_err();

        let first = writer
            .quarantine(bytes, "bad_session.json", &err, Utc::now())
            .unwrap();
        assert_eq!(first.reason, RejectReason::MalformedPayload);
        assert_eq!(fs::read(&first.path).unwrap(), bytes);

        let listed = writer.quarantined();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].1.original_name, "bad_session.json");

        let second = writer
            .quarantine(bytes, "again_session.json", &err, Utc::now())
            .unwrap();
        assert_eq!(second.path, first.path);
        assert_eq!(fs::read_dir(writer.quarantine_dir()).unwrap().count(), 2);
    }
}
