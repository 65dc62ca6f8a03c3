use std::path::Path;

use sled::Db;
use tracing::debug;

use crate::archive_record::ArchiveRecord;
use crate::archive_store::{sort_newest_first, ArchiveStore};
use crate::errors::{BackupError, BackupResult};

const ARCHIVE_TREE: &str = "backup_archive";

/// A sled-backed implementation of ArchiveStore.
pub struct ArchiveStoreSled {
    db: Db,
}

impl ArchiveStoreSled {
    /// Opens (or creates) the catalog database at `path`.
    pub fn new(path: &Path) -> BackupResult<Self> {
        let db = sled::open(path)
            .map_err(|e| BackupError::database(format!("open {}", path.display()), e))?;
        Ok(ArchiveStoreSled { db })
    }

    fn serialize_record(record: &ArchiveRecord) -> BackupResult<Vec<u8>> {
        serde_json::to_vec(record)
            .map_err(|e| BackupError::serialization("encode archive record", e))
    }

    fn deserialize_record(bytes: &[u8]) -> BackupResult<ArchiveRecord> {
        serde_json::from_slice(bytes)
            .map_err(|e| BackupError::serialization("decode archive record", e))
    }

    fn tree(&self) -> BackupResult<sled::Tree> {
        self.db
            .open_tree(ARCHIVE_TREE)
            .map_err(|e| BackupError::database("open archive tree", e))
    }
}

impl ArchiveStore for ArchiveStoreSled {
    fn insert(&self, record: &ArchiveRecord) -> BackupResult<()> {
        let data = Self::serialize_record(record)?;
        let tree = self.tree()?;
        let swapped = tree.compare_and_swap(
            record.name.as_bytes(),
            None as Option<&[u8]>,
            Some(data),
        )?;
        if swapped.is_err() {
            return Err(BackupError::validation(
                "name",
                format!("Archive {} already exists", record.name),
            ));
        }
        tree.flush()?;
        debug!(archive = %record.name, "archive record inserted");
        Ok(())
    }

    fn get(&self, name: &str) -> BackupResult<Option<ArchiveRecord>> {
        let tree = self.tree()?;
        match tree.get(name.as_bytes())? {
            Some(bytes) => Ok(Some(Self::deserialize_record(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save(&self, record: &ArchiveRecord) -> BackupResult<()> {
        let tree = self.tree()?;
        if !tree.contains_key(record.name.as_bytes())? {
            return Err(BackupError::not_found("Backup Archive", &record.name));
        }
        let data = Self::serialize_record(record)?;
        tree.insert(record.name.as_bytes(), data)?;
        tree.flush()?;
        debug!(archive = %record.name, status = %record.status, "archive record saved");
        Ok(())
    }

    fn list(&self) -> BackupResult<Vec<ArchiveRecord>> {
        let tree = self.tree()?;
        let mut records = Vec::new();
        for item in tree.iter() {
            let (_, value) = item?;
            records.push(Self::deserialize_record(&value)?);
        }
        sort_newest_first(&mut records);
        Ok(records)
    }
}
