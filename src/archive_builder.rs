// Archive Builder
// Purpose: run a dump into a fresh stamped directory, optionally bundle it, and commit one catalog record

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::archive_record::{ArchiveRecord, ArchiveSource, ArtifactKind};
use crate::audit::audited;
use crate::dump_generator::DumpRequest;
use crate::engine::ArchiveEngine;
use crate::errors::{BackupError, BackupResult};
use crate::request_context::RequestContext;

pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub label: Option<String>,
    pub include_files: bool,
    pub bundle: bool,
    pub source: ArchiveSource,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            label: None,
            include_files: true,
            bundle: true,
            source: ArchiveSource::Manual,
        }
    }
}

/// Absolute paths produced by one backup operation. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    pub db: Option<PathBuf>,
    pub public: Option<PathBuf>,
    pub private: Option<PathBuf>,
    pub bundle: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

impl ArtifactSet {
    pub fn get(&self, kind: ArtifactKind) -> Option<&Path> {
        match kind {
            ArtifactKind::Bundle => self.bundle.as_deref(),
            ArtifactKind::Db => self.db.as_deref(),
            ArtifactKind::Public => self.public.as_deref(),
            ArtifactKind::Private => self.private.as_deref(),
            ArtifactKind::Config => self.config.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FileRef {
    pub path: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BackupFiles {
    pub bundle: FileRef,
    pub db: FileRef,
    pub public: FileRef,
    pub private: FileRef,
    pub config: FileRef,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BackupCreated {
    pub name: String,
    pub title: String,
    pub source: ArchiveSource,
    pub files: BackupFiles,
}

impl ArchiveEngine {
    /// Take a backup and catalog it.
    ///
    /// The record insert is the commit point: nothing is persisted if the
    /// dump or the bundle fails. Files already on disk are left in place.
    pub fn create_backup(
        &self,
        ctx: &RequestContext,
        options: BackupOptions,
    ) -> BackupResult<BackupCreated> {
        let result = self.run_backup(ctx, options);
        let name = result.as_ref().ok().map(|created| created.name.clone());
        audited(ctx, "create_backup", name.as_deref(), result)
    }

    fn run_backup(&self, ctx: &RequestContext, options: BackupOptions) -> BackupResult<BackupCreated> {
        ctx.require_backup_manager()?;

        let timestamp = Utc::now().format(STAMP_FORMAT).to_string();
        let (stamp, backup_dir) = self
            .sandbox
            .create_operation_dir(&format!("{timestamp}_{}", self.config.site_stamp()))?;
        info!(stamp = %stamp, source = %options.source, include_files = options.include_files, "backup started");

        let dump = self.dumper.generate(&DumpRequest {
            ignore_files: !options.include_files,
            force: true,
            target_dir: backup_dir.clone(),
        })?;

        let mut artifacts = ArtifactSet {
            db: dump.db,
            public: dump.public_files.filter(|_| options.include_files),
            private: dump.private_files.filter(|_| options.include_files),
            bundle: None,
            config: dump.config,
        };

        if options.bundle {
            let bundle_path = backup_dir.join(format!("{stamp}_bundle.zip"));
            build_bundle(
                &bundle_path,
                &[
                    artifacts.db.as_deref(),
                    artifacts.public.as_deref(),
                    artifacts.private.as_deref(),
                    artifacts.config.as_deref(),
                ],
            )?;
            artifacts.bundle = Some(bundle_path);
        }

        let title = options
            .label
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Backup {timestamp}"));

        let record = self.record_from_artifacts(
            ArchiveRecord::new(&title, options.source, &ctx.principal),
            &artifacts,
        )?;
        self.store.insert(&record)?;
        info!(archive = %record.name, stamp = %stamp, db_size = record.db_size, "backup committed");

        Ok(self.describe_backup(&record))
    }

    /// Fill the artifact slots of `record` from absolute paths.
    ///
    /// Artifacts that do not exist on disk leave their slot empty.
    pub(crate) fn record_from_artifacts(
        &self,
        mut record: ArchiveRecord,
        artifacts: &ArtifactSet,
    ) -> BackupResult<ArchiveRecord> {
        for kind in ArtifactKind::ALL {
            let existing = artifacts.get(kind).filter(|p| p.is_file());
            let rel = self.sandbox.to_relative_opt(existing)?;
            let size = existing.map(file_size).unwrap_or(0);
            record.set_artifact(kind, rel, size);
        }
        Ok(record)
    }

    pub(crate) fn describe_backup(&self, record: &ArchiveRecord) -> BackupCreated {
        let file_ref = |kind: ArtifactKind| FileRef {
            path: record.artifact_path(kind).map(str::to_string),
            url: self.download_url(record.artifact_path(kind)),
        };
        BackupCreated {
            name: record.name.clone(),
            title: record.title.clone(),
            source: record.source,
            files: BackupFiles {
                bundle: file_ref(ArtifactKind::Bundle),
                db: file_ref(ArtifactKind::Db),
                public: file_ref(ArtifactKind::Public),
                private: file_ref(ArtifactKind::Private),
                config: file_ref(ArtifactKind::Config),
            },
        }
    }
}

/// Zip every existing file of `files` into `bundle_path`, flat, by file name.
pub fn build_bundle(bundle_path: &Path, files: &[Option<&Path>]) -> BackupResult<()> {
    let out = File::create(bundle_path).map_err(|e| BackupError::io("creating bundle", e))?;
    let mut zip = ZipWriter::new(out);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    for path in files.iter().flatten() {
        if !path.is_file() {
            debug!(file = %path.display(), "bundle: skipping missing artifact");
            continue;
        }
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        zip.start_file(name.as_str(), options)
            .map_err(|e| BackupError::bundle(format!("adding {name}"), e))?;
        let mut input = File::open(path).map_err(|e| BackupError::io("reading artifact", e))?;
        io::copy(&mut input, &mut zip).map_err(|e| BackupError::io("writing bundle", e))?;
    }

    zip.finish()
        .map_err(|e| BackupError::bundle("finalizing bundle", e))?;
    debug!(bundle = %bundle_path.display(), "bundle written");
    Ok(())
}

fn file_size(path: &Path) -> u64 {
    path.metadata().map(|m| m.len()).unwrap_or(0)
}
