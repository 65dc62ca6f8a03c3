use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::{BackupError, BackupResult};

/// Where an archive came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveSource {
    Manual,
    Scheduled,
    Uploaded,
    #[serde(rename = "Pre-Restore")]
    PreRestore,
}

impl FromStr for ArchiveSource {
    type Err = BackupError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "" | "manual" => Ok(ArchiveSource::Manual),
            "scheduled" => Ok(ArchiveSource::Scheduled),
            "uploaded" => Ok(ArchiveSource::Uploaded),
            "pre-restore" | "pre_restore" | "prerestore" => Ok(ArchiveSource::PreRestore),
            other => Err(BackupError::validation(
                "source",
                format!("unknown archive source '{other}'"),
            )),
        }
    }
}

impl fmt::Display for ArchiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ArchiveSource::Manual => "Manual",
            ArchiveSource::Scheduled => "Scheduled",
            ArchiveSource::Uploaded => "Uploaded",
            ArchiveSource::PreRestore => "Pre-Restore",
        };
        f.write_str(label)
    }
}

/// Lifecycle status. This engine only ever moves `Ready -> Restoring`;
/// `Failed` is reserved for external recovery tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveStatus {
    Ready,
    Restoring,
    Failed,
}

impl fmt::Display for ArchiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The artifact slots of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Bundle,
    Db,
    Public,
    Private,
    Config,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 5] = [
        ArtifactKind::Bundle,
        ArtifactKind::Db,
        ArtifactKind::Public,
        ArtifactKind::Private,
        ArtifactKind::Config,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            ArtifactKind::Bundle => "bundle",
            ArtifactKind::Db => "db",
            ArtifactKind::Public => "public",
            ArtifactKind::Private => "private",
            ArtifactKind::Config => "config",
        }
    }
}

/// One catalog entry. Paths are relative to the site's private root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub name: String,
    pub title: String,
    pub source: ArchiveSource,
    pub status: ArchiveStatus,
    pub created_on: DateTime<Utc>,
    pub created_by: String,
    pub db_file_path: Option<String>,
    pub db_size: u64,
    pub public_file_path: Option<String>,
    pub public_size: u64,
    pub private_file_path: Option<String>,
    pub private_size: u64,
    pub bundle_file_path: Option<String>,
    pub bundle_size: u64,
    pub config_file_path: Option<String>,
    pub config_size: u64,
    pub restore_log_path: Option<String>,
    pub restore_log_size: u64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ArchiveRecord {
    /// A `Ready` record with no artifacts attached yet.
    pub fn new(title: &str, source: ArchiveSource, created_by: &str) -> Self {
        let created_on = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        ArchiveRecord {
            name: format!("ARCH-{}-{}", created_on.format("%Y%m%d%H%M%S"), &suffix[..8]),
            title: title.to_string(),
            source,
            status: ArchiveStatus::Ready,
            created_on,
            created_by: created_by.to_string(),
            db_file_path: None,
            db_size: 0,
            public_file_path: None,
            public_size: 0,
            private_file_path: None,
            private_size: 0,
            bundle_file_path: None,
            bundle_size: 0,
            config_file_path: None,
            config_size: 0,
            restore_log_path: None,
            restore_log_size: 0,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn set_artifact(&mut self, kind: ArtifactKind, path: Option<String>, size: u64) {
        let size = if path.is_some() { size } else { 0 };
        let (slot, slot_size) = match kind {
            ArtifactKind::Bundle => (&mut self.bundle_file_path, &mut self.bundle_size),
            ArtifactKind::Db => (&mut self.db_file_path, &mut self.db_size),
            ArtifactKind::Public => (&mut self.public_file_path, &mut self.public_size),
            ArtifactKind::Private => (&mut self.private_file_path, &mut self.private_size),
            ArtifactKind::Config => (&mut self.config_file_path, &mut self.config_size),
        };
        *slot = path;
        *slot_size = size;
    }

    pub fn artifact_path(&self, kind: ArtifactKind) -> Option<&str> {
        match kind {
            ArtifactKind::Bundle => self.bundle_file_path.as_deref(),
            ArtifactKind::Db => self.db_file_path.as_deref(),
            ArtifactKind::Public => self.public_file_path.as_deref(),
            ArtifactKind::Private => self.private_file_path.as_deref(),
            ArtifactKind::Config => self.config_file_path.as_deref(),
        }
    }

    pub fn artifact_size(&self, kind: ArtifactKind) -> u64 {
        match kind {
            ArtifactKind::Bundle => self.bundle_size,
            ArtifactKind::Db => self.db_size,
            ArtifactKind::Public => self.public_size,
            ArtifactKind::Private => self.private_size,
            ArtifactKind::Config => self.config_size,
        }
    }

    /// Fails unless the record can still move to `Restoring`.
    pub fn ensure_restorable(&self) -> BackupResult<()> {
        if self.status != ArchiveStatus::Ready {
            return Err(BackupError::validation(
                "status",
                format!("Archive {} is {} and cannot be restored.", self.name, self.status),
            ));
        }
        Ok(())
    }

    /// The single post-creation mutation: `Ready -> Restoring`.
    pub fn begin_restore(&mut self, restore_log_path: String, restore_log_size: u64) -> BackupResult<()> {
        self.ensure_restorable()?;
        self.status = ArchiveStatus::Restoring;
        self.restore_log_path = Some(restore_log_path);
        self.restore_log_size = restore_log_size;
        Ok(())
    }
}
