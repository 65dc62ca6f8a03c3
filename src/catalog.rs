// Archive Catalog
// Purpose: list, fetch and download archive records with computed download references

use std::path::PathBuf;

use serde::Serialize;

use crate::archive_record::{ArchiveRecord, ArtifactKind};
use crate::audit::audited;
use crate::engine::ArchiveEngine;
use crate::errors::{BackupError, BackupResult};
use crate::request_context::RequestContext;

/// Why a record is being fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessIntent {
    Read,
    Write,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ArchiveDownloads {
    pub bundle: Option<String>,
    pub db: Option<String>,
    pub public: Option<String>,
    pub private: Option<String>,
    pub config: Option<String>,
}

/// A catalog row as returned by `list_archives`.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveListing {
    #[serde(flatten)]
    pub record: ArchiveRecord,
    pub downloads: ArchiveDownloads,
    pub restore_log_url: Option<String>,
}

/// A file resolved for download.
#[derive(Debug, Clone)]
pub struct ArchiveFile {
    pub path: PathBuf,
    pub relative_path: String,
    pub file_name: String,
    pub size: u64,
}

impl ArchiveEngine {
    /// All archives, newest first.
    pub fn list_archives(&self, ctx: &RequestContext) -> BackupResult<Vec<ArchiveListing>> {
        ctx.require_backup_manager()?;
        let records = self.store.list()?;
        Ok(records.into_iter().map(|r| self.listing(r)).collect())
    }

    pub fn listing(&self, record: ArchiveRecord) -> ArchiveListing {
        let url = |kind: ArtifactKind| self.download_url(record.artifact_path(kind));
        let downloads = ArchiveDownloads {
            bundle: url(ArtifactKind::Bundle),
            db: url(ArtifactKind::Db),
            public: url(ArtifactKind::Public),
            private: url(ArtifactKind::Private),
            config: url(ArtifactKind::Config),
        };
        let restore_log_url = self.download_url(record.restore_log_path.as_deref());
        ArchiveListing {
            record,
            downloads,
            restore_log_url,
        }
    }

    /// Fetch one record. `Write` additionally checks write permission.
    pub fn get_archive(
        &self,
        ctx: &RequestContext,
        name: &str,
        intent: AccessIntent,
    ) -> BackupResult<ArchiveRecord> {
        ctx.require_backup_manager()?;
        if intent == AccessIntent::Write {
            ctx.require_archive_write(name)?;
        }
        self.store
            .get(name)?
            .ok_or_else(|| BackupError::not_found("Backup Archive", name))
    }

    /// Resolve a stored relative path for streaming to the caller.
    pub fn download_archive_file(&self, ctx: &RequestContext, path: &str) -> BackupResult<ArchiveFile> {
        let result = self.resolve_download(ctx, path);
        let target = result.as_ref().ok().map(|f| f.relative_path.clone());
        audited(ctx, "download_archive_file", target.as_deref(), result)
    }

    fn resolve_download(&self, ctx: &RequestContext, path: &str) -> BackupResult<ArchiveFile> {
        ctx.require_backup_manager()?;
        let resolved = self.sandbox.resolve_relative(path)?;
        let file_name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if !resolved.is_file() {
            return Err(BackupError::not_found("archive file", file_name));
        }
        let relative_path = self.sandbox.to_relative(&resolved)?;
        let size = resolved
            .metadata()
            .map_err(|e| BackupError::io("reading archive file metadata", e))?
            .len();
        Ok(ArchiveFile {
            path: resolved,
            relative_path,
            file_name,
            size,
        })
    }
}
