use crate::archive_record::ArchiveRecord;
use crate::errors::BackupResult;

/// Document store holding archive records.
///
/// Permission checks happen in the engine before any of these are called.
pub trait ArchiveStore: Send + Sync {
    /// Insert a new record. Fails if a record with the same name exists.
    fn insert(&self, record: &ArchiveRecord) -> BackupResult<()>;

    fn get(&self, name: &str) -> BackupResult<Option<ArchiveRecord>>;

    /// Persist changes to an existing record.
    fn save(&self, record: &ArchiveRecord) -> BackupResult<()>;

    /// All records, newest first.
    fn list(&self) -> BackupResult<Vec<ArchiveRecord>>;
}

/// Newest-created first; ties broken by name so the order is stable.
pub fn sort_newest_first(records: &mut [ArchiveRecord]) {
    records.sort_by(|a, b| {
        b.created_on
            .cmp(&a.created_on)
            .then_with(|| b.name.cmp(&a.name))
    });
}
