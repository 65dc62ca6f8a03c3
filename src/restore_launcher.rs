// Restore Launcher
// Purpose: snapshot, generate the restore script, spawn it detached, and mark the archive Restoring

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::archive_builder::{ArtifactSet, BackupOptions, STAMP_FORMAT};
use crate::archive_record::{ArchiveRecord, ArchiveSource, ArtifactKind};
use crate::audit::audited;
use crate::bench::locate_bench;
use crate::catalog::AccessIntent;
use crate::engine::ArchiveEngine;
use crate::errors::{BackupError, BackupResult};
use crate::request_context::RequestContext;
use crate::restore_script::{RestoreCredentials, RestorePlan};

pub const ALLOWED_DB_EXTENSIONS: [&str; 3] = [".sql", ".sql.gz", ".gz"];

const UPLOAD_NOTES: &str = "Uploaded via Backup Center";

/// The database artifact must exist and look like a SQL dump.
pub fn validate_db_file(path: &Path) -> BackupResult<()> {
    if !path.is_file() {
        return Err(BackupError::validation(
            "db_file",
            "Database backup file not found.",
        ));
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if !ALLOWED_DB_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
        return Err(BackupError::validation(
            "db_file",
            "Database backup must be a .sql or .sql.gz file.",
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestoreStarted {
    pub status: String,
    pub archive: String,
    pub restore_log_path: String,
    pub restore_log_url: Option<String>,
    pub pre_restore_backup: String,
}

/// Handle-free description of a launched restore.
#[derive(Debug, Clone)]
pub struct RestoreJob {
    pub script_path: PathBuf,
    pub log_path: PathBuf,
    pub pid: u32,
}

/// Site URLs of freshly uploaded files.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadedFiles {
    pub db_file: String,
    #[serde(default)]
    pub public_file: Option<String>,
    #[serde(default)]
    pub private_file: Option<String>,
}

struct RestoreInputs {
    db: PathBuf,
    public: Option<PathBuf>,
    private: Option<PathBuf>,
}

impl ArchiveEngine {
    /// Restore the site from a cataloged archive.
    pub fn restore_from_archive(
        &self,
        ctx: &RequestContext,
        archive_name: &str,
        credentials: RestoreCredentials,
    ) -> BackupResult<RestoreStarted> {
        let result = self
            .get_archive(ctx, archive_name, AccessIntent::Write)
            .and_then(|record| {
                let inputs = self.restore_inputs(&record)?;
                self.start_restore(ctx, record, inputs, credentials)
            });
        audited(ctx, "restore_from_archive", Some(archive_name), result)
    }

    /// Catalog uploaded files as a new archive, then restore from it.
    pub fn restore_from_upload(
        &self,
        ctx: &RequestContext,
        uploads: &UploadedFiles,
        credentials: RestoreCredentials,
    ) -> BackupResult<RestoreStarted> {
        let result = self.catalog_upload(ctx, uploads).and_then(|(record, inputs)| {
            self.start_restore(ctx, record, inputs, credentials)
        });
        let target = result.as_ref().ok().map(|started| started.archive.clone());
        audited(ctx, "restore_from_upload", target.as_deref(), result)
    }

    /// The script `restore_from_archive` would run, with passwords masked.
    pub fn preview_restore_script(
        &self,
        ctx: &RequestContext,
        archive_name: &str,
        credentials: RestoreCredentials,
    ) -> BackupResult<String> {
        let record = self.get_archive(ctx, archive_name, AccessIntent::Read)?;
        let inputs = self.restore_inputs(&record)?;
        validate_db_file(&inputs.db)?;
        let bench = locate_bench(&self.config)
            .unwrap_or_else(|_| PathBuf::from(self.config.bench_command.trim()));
        let plan = self.plan(&bench, &inputs, credentials)?;
        Ok(plan.render_masked())
    }

    fn restore_inputs(&self, record: &ArchiveRecord) -> BackupResult<RestoreInputs> {
        let db_rel = record
            .artifact_path(ArtifactKind::Db)
            .ok_or_else(|| BackupError::validation("db_file", "Database backup file not found."))?;
        let db = self.sandbox.resolve_relative(db_rel)?;

        // recorded artifacts must still be on disk
        let optional =
            |kind: ArtifactKind, field: &str, label: &str| -> BackupResult<Option<PathBuf>> {
                let Some(rel) = record.artifact_path(kind) else {
                    return Ok(None);
                };
                let path = self.sandbox.resolve_relative(rel)?;
                if !path.is_file() {
                    return Err(BackupError::validation(
                        field,
                        format!("{label} backup file not found."),
                    ));
                }
                Ok(Some(path))
            };

        Ok(RestoreInputs {
            db,
            public: optional(ArtifactKind::Public, "public_file", "Public files")?,
            private: optional(ArtifactKind::Private, "private_file", "Private files")?,
        })
    }

    fn catalog_upload(
        &self,
        ctx: &RequestContext,
        uploads: &UploadedFiles,
    ) -> BackupResult<(ArchiveRecord, RestoreInputs)> {
        ctx.require_backup_manager()?;

        let db_src = self.sandbox.resolve_uploaded(&uploads.db_file)?;
        validate_db_file(&db_src)?;
        let resolve_optional = |url: &Option<String>| -> BackupResult<Option<PathBuf>> {
            match url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
                Some(url) => self.sandbox.resolve_uploaded(url).map(Some),
                None => Ok(None),
            }
        };
        let public_src = resolve_optional(&uploads.public_file)?;
        let private_src = resolve_optional(&uploads.private_file)?;

        let timestamp = Utc::now().format(STAMP_FORMAT).to_string();
        let (stamp, upload_dir) = self
            .sandbox
            .create_operation_dir(&format!("uploaded_{timestamp}_{}", self.config.site_stamp()))?;

        let db = copy_into(&upload_dir, &db_src, ArtifactKind::Db)?;
        let public = public_src
            .map(|src| copy_into(&upload_dir, &src, ArtifactKind::Public))
            .transpose()?;
        let private = private_src
            .map(|src| copy_into(&upload_dir, &src, ArtifactKind::Private))
            .transpose()?;

        let record = self.record_from_artifacts(
            ArchiveRecord::new(
                &format!("Uploaded Backup {timestamp}"),
                ArchiveSource::Uploaded,
                &ctx.principal,
            )
            .with_notes(UPLOAD_NOTES),
            &ArtifactSet {
                db: Some(db.clone()),
                public: public.clone(),
                private: private.clone(),
                bundle: None,
                config: None,
            },
        )?;
        self.store.insert(&record)?;
        info!(archive = %record.name, stamp = %stamp, "uploaded files cataloged");

        Ok((record, RestoreInputs { db, public, private }))
    }

    fn plan(
        &self,
        bench: &Path,
        inputs: &RestoreInputs,
        credentials: RestoreCredentials,
    ) -> BackupResult<RestorePlan> {
        RestorePlan::new(
            &self.config.bench_root(),
            bench,
            &self.config.site,
            &inputs.db,
            inputs.public.as_deref(),
            inputs.private.as_deref(),
            credentials,
        )
    }

    /// Requested -> SnapshotTaken -> Launched -> Committed.
    fn start_restore(
        &self,
        ctx: &RequestContext,
        mut record: ArchiveRecord,
        inputs: RestoreInputs,
        credentials: RestoreCredentials,
    ) -> BackupResult<RestoreStarted> {
        validate_db_file(&inputs.db)?;
        record.ensure_restorable()?;

        // no restore without a safety net
        let snapshot = self.create_backup(
            ctx,
            BackupOptions {
                label: Some(format!("Pre-restore backup ({})", record.name)),
                include_files: true,
                bundle: true,
                source: ArchiveSource::PreRestore,
            },
        )?;
        info!(archive = %record.name, snapshot = %snapshot.name, "pre-restore snapshot taken");

        let bench = locate_bench(&self.config)?;
        let work_dir = inputs
            .db
            .parent()
            .ok_or_else(|| BackupError::internal("database file has no parent directory"))?;
        let timestamp = Utc::now().format(STAMP_FORMAT).to_string();
        let script_path = work_dir.join(format!("restore_{timestamp}.sh"));
        let log_path = work_dir.join(format!("restore_{timestamp}.log"));

        self.plan(&bench, &inputs, credentials)?.write_to(&script_path)?;
        info!(script = %script_path.display(), "restore script generated");

        let job = spawn_detached(&script_path, &log_path, &self.config.bench_root(), &record.name)?;

        let log_rel = self.sandbox.to_relative(&job.log_path)?;
        let log_size = fs::metadata(&job.log_path).map(|m| m.len()).unwrap_or(0);
        record.begin_restore(log_rel.clone(), log_size)?;
        self.store.save(&record)?;
        info!(archive = %record.name, pid = job.pid, log = %log_rel, "archive marked restoring");

        Ok(RestoreStarted {
            status: "started".to_string(),
            archive: record.name.clone(),
            restore_log_url: self.download_url(Some(&log_rel)),
            restore_log_path: log_rel,
            pre_restore_backup: snapshot.name,
        })
    }
}

/// Copy an uploaded file into `dir`, keeping its name unless taken.
fn copy_into(dir: &Path, src: &Path, kind: ArtifactKind) -> BackupResult<PathBuf> {
    let name = src
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| BackupError::invalid_path("Invalid file path."))?;
    let mut dest = dir.join(&name);
    if dest.exists() {
        dest = dir.join(format!("{}-{name}", kind.key()));
    }
    fs::copy(src, &dest).map_err(|e| BackupError::io("copying uploaded file", e))?;
    Ok(dest)
}

/// Start `script` in its own process group with output appended to `log`.
///
/// The engine keeps no handle; a reaper thread waits on the child so it
/// never lingers as a zombie and logs how it ended.
pub fn spawn_detached(script: &Path, log: &Path, cwd: &Path, archive: &str) -> BackupResult<RestoreJob> {
    let mut log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log)
        .map_err(|e| BackupError::io("opening restore log", e))?;
    writeln!(
        log_file,
        "[{}] restore of {archive} started",
        Utc::now().to_rfc3339()
    )
    .map_err(|e| BackupError::io("writing restore log", e))?;
    let stderr = log_file
        .try_clone()
        .map_err(|e| BackupError::io("duplicating restore log handle", e))?;

    let mut cmd = Command::new("bash");
    cmd.arg(script)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(stderr));
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| BackupError::spawn(format!("failed to start restore script: {e}")))?;
    let pid = child.id();
    info!(pid, log = %log.display(), "restore process spawned");

    let archive = archive.to_string();
    let reaper = std::thread::Builder::new()
        .name(format!("restore-reaper-{pid}"))
        .spawn(move || match child.wait() {
            Ok(status) if status.success() => info!(pid, archive = %archive, "restore process finished"),
            Ok(status) => warn!(pid, archive = %archive, %status, "restore process failed"),
            Err(e) => warn!(pid, archive = %archive, error = %e, "could not wait on restore process"),
        });
    if let Err(e) = reaper {
        warn!(pid, error = %e, "restore reaper thread not started");
    }

    Ok(RestoreJob {
        script_path: script.to_path_buf(),
        log_path: log.to_path_buf(),
        pid,
    })
}
