use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::core::{EngineError, Result};

use super::audit::AuditEntry;
use super::evidence::{Allocation, Communication};
use super::record::EntityRecord;

const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Append-only audit journal.
///
/// Every committed audit entry is appended as a length-prefixed MessagePack
/// frame and flushed before the in-memory state changes, so the on-disk trail
/// never lags a visible write. All of a commit's entries are serialized into
/// one buffer and written in a single operation, so a failure mid-batch
/// leaves no partial trail for a commit that never applied.
pub struct AuditJournal {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl AuditJournal {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        ensure_parent_dir(&path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| EngineError::Journal(format!("failed to open journal: {}", e)))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, entry: &AuditEntry) -> Result<()> {
        self.append_batch(std::slice::from_ref(entry))
    }

    /// Append several entries as one write. Every frame is serialized before
    /// any byte reaches the file, so a serialization failure writes nothing.
    pub fn append_batch(&mut self, entries: &[AuditEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::new();
        for entry in entries {
            let data = rmp_serde::to_vec(entry)
                .map_err(|e| EngineError::Journal(format!("failed to serialize entry: {}", e)))?;
            buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
            buf.extend_from_slice(&data);
        }
        self.writer
            .write_all(&buf)
            .map_err(|e| EngineError::Journal(format!("failed to write entries: {}", e)))?;
        self.writer
            .flush()
            .map_err(|e| EngineError::Journal(format!("failed to flush journal: {}", e)))?;
        Ok(())
    }

    /// Read every entry a journal file holds, oldest first.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<AuditEntry>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(path)
            .map_err(|e| EngineError::Journal(format!("failed to open journal: {}", e)))?;
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        loop {
            let mut len_bytes = [0u8; 4];
            match reader.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    return Err(EngineError::Journal(format!(
                        "failed to read entry length: {}",
                        e
                    )));
                }
            }
            let len = u32::from_le_bytes(len_bytes) as usize;
            let mut data = vec![0u8; len];
            reader
                .read_exact(&mut data)
                .map_err(|e| EngineError::Journal(format!("failed to read entry: {}", e)))?;
            let entry: AuditEntry = rmp_serde::from_slice(&data)
                .map_err(|e| EngineError::Journal(format!("failed to decode entry: {}", e)))?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

/// Serializable image of a whole store, written atomically to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub format_version: u32,
    pub taken_at: DateTime<Utc>,
    pub records: Vec<EntityRecord>,
    pub allocations: Vec<Allocation>,
    pub communications: Vec<Communication>,
    pub audit: Vec<AuditEntry>,
}

impl StoreSnapshot {
    pub fn new(
        records: Vec<EntityRecord>,
        allocations: Vec<Allocation>,
        communications: Vec<Communication>,
        audit: Vec<AuditEntry>,
    ) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            taken_at: Utc::now(),
            records,
            allocations,
            communications,
            audit,
        }
    }

    pub fn check_format(&self) -> Result<()> {
        if self.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(EngineError::Storage(format!(
                "unsupported snapshot format {} (expected {})",
                self.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        Ok(())
    }
}

/// Writes and reads store snapshots at a fixed path.
pub struct SnapshotManager {
    path: PathBuf,
}

impl SnapshotManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write via a temp file in the same directory, then rename over the
    /// target so a crash mid-write never leaves a torn snapshot.
    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        ensure_parent_dir(&self.path)?;
        let dir = parent_dir(&self.path);
        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|e| EngineError::Storage(format!("failed to create temp snapshot: {}", e)))?;
        let data = rmp_serde::to_vec(snapshot)
            .map_err(|e| EngineError::Storage(format!("failed to serialize snapshot: {}", e)))?;
        tmp.write_all(&data)
            .map_err(|e| EngineError::Storage(format!("failed to write snapshot: {}", e)))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| EngineError::Storage(format!("failed to sync snapshot: {}", e)))?;
        tmp.persist(&self.path)
            .map_err(|e| EngineError::Storage(format!("failed to persist snapshot: {}", e)))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path)
            .map_err(|e| EngineError::Storage(format!("failed to read snapshot: {}", e)))?;
        let snapshot = rmp_serde::from_slice(&data)
            .map_err(|e| EngineError::Storage(format!("failed to decode snapshot: {}", e)))?;
        Ok(Some(snapshot))
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent)
            .map_err(|e| EngineError::Storage(format!("failed to create {:?}: {}", parent, e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AuditAction, EntityKind};
    use crate::store::record::EntityRecord;
    use chrono::Utc;

    #[test]
    fn journal_appends_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.journal");

        let target = EntityRecord::new(EntityKind::Warehouse, "North Dock").entity_ref();
        let mut journal = AuditJournal::open(&path).unwrap();
        journal
            .append(&AuditEntry::new(
                target,
                AuditAction::SoftDelete,
                "ops",
                None,
                Utc::now(),
            ))
            .unwrap();
        journal
            .append(&AuditEntry::new(
                target,
                AuditAction::Purge,
                "system",
                Some("retention window of 180 days elapsed".into()),
                Utc::now(),
            ))
            .unwrap();
        drop(journal);

        let entries = AuditJournal::read_all(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, AuditAction::SoftDelete);
        assert_eq!(entries[1].actor, "system");
    }

    #[test]
    fn batch_appends_interleave_with_single_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.journal");
        let target = EntityRecord::new(EntityKind::Customer, "Acme").entity_ref();

        let mut journal = AuditJournal::open(&path).unwrap();
        journal.append_batch(&[]).unwrap();
        journal
            .append_batch(&[
                AuditEntry::new(target, AuditAction::SoftDelete, "ops", None, Utc::now()),
                AuditEntry::new(target, AuditAction::Purge, "system", None, Utc::now()),
            ])
            .unwrap();
        journal
            .append(&AuditEntry::new(
                target,
                AuditAction::Reactivate,
                "ops",
                None,
                Utc::now(),
            ))
            .unwrap();
        drop(journal);

        let entries = AuditJournal::read_all(&path).unwrap();
        let actions: Vec<_> = entries.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::SoftDelete,
                AuditAction::Purge,
                AuditAction::Reactivate
            ]
        );
    }

    #[test]
    fn missing_journal_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let entries = AuditJournal::read_all(dir.path().join("absent.journal")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn snapshot_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SnapshotManager::new(dir.path().join("store.snapshot"));
        assert!(!manager.exists());
        assert!(manager.load().unwrap().is_none());

        let record = EntityRecord::new(EntityKind::Customer, "Acme");
        let snapshot = StoreSnapshot::new(vec![record.clone()], vec![], vec![], vec![]);
        manager.save(&snapshot).unwrap();

        let loaded = manager.load().unwrap().unwrap();
        loaded.check_format().unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.records[0].id, record.id);
    }

    #[test]
    fn future_format_versions_are_rejected() {
        let mut snapshot = StoreSnapshot::new(vec![], vec![], vec![], vec![]);
        snapshot.format_version = 99;
        assert!(snapshot.check_format().is_err());
    }
}
