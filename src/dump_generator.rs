//! Dump generation: the collaborator that writes the raw database dump,
//! file archives and config snapshot into a target directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::bench::locate_bench;
use crate::config::BackupCenterConfig;
use crate::errors::{BackupError, BackupResult};

/// Flags handed to the dump generator.
#[derive(Debug, Clone)]
pub struct DumpRequest {
    pub ignore_files: bool,
    pub force: bool,
    pub target_dir: PathBuf,
}

/// Files produced by one dump. Any of them may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DumpArtifacts {
    pub db: Option<PathBuf>,
    pub public_files: Option<PathBuf>,
    pub private_files: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

pub trait DumpGenerator: Send + Sync {
    fn generate(&self, request: &DumpRequest) -> BackupResult<DumpArtifacts>;
}

/// Runs `bench --site <site> backup --backup-path <dir> [--with-files]`.
pub struct BenchDumpGenerator {
    config: BackupCenterConfig,
}

impl BenchDumpGenerator {
    pub fn new(config: BackupCenterConfig) -> Self {
        Self { config }
    }
}

impl DumpGenerator for BenchDumpGenerator {
    fn generate(&self, request: &DumpRequest) -> BackupResult<DumpArtifacts> {
        let bench = locate_bench(&self.config)?;

        let mut cmd = Command::new(&bench);
        cmd.current_dir(self.config.bench_root())
            .arg("--site")
            .arg(&self.config.site)
            .arg("backup")
            .arg("--backup-path")
            .arg(&request.target_dir);
        if !request.ignore_files {
            cmd.arg("--with-files");
        }

        info!(
            site = %self.config.site,
            target = %request.target_dir.display(),
            with_files = !request.ignore_files,
            force = request.force,
            "running dump generation"
        );
        let output = cmd
            .output()
            .map_err(|e| BackupError::dump(format!("failed to run {}: {e}", bench.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(BackupError::dump(format!(
                "bench backup exited with {}: {tail}",
                output.status
            )));
        }

        classify_artifacts(&request.target_dir)
    }
}

/// Sort the files of a dump directory into artifact slots by name suffix.
pub fn classify_artifacts(dir: &Path) -> BackupResult<DumpArtifacts> {
    let mut names: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| BackupError::io("reading dump directory", e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    names.sort();

    let mut artifacts = DumpArtifacts::default();
    for path in names {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_lowercase()) else {
            continue;
        };
        // "-private-files" must be tested before "-files"
        if has_suffix(&name, "-private-files", &[".tar", ".tgz", ".tar.gz"]) {
            artifacts.private_files = Some(path);
        } else if has_suffix(&name, "-files", &[".tar", ".tgz", ".tar.gz"]) {
            artifacts.public_files = Some(path);
        } else if has_suffix(&name, "-database", &[".sql", ".sql.gz"]) {
            artifacts.db = Some(path);
        } else if name.ends_with("-site_config_backup.json") {
            artifacts.config = Some(path);
        } else {
            debug!(file = %name, "ignoring unrecognised dump output");
        }
    }
    Ok(artifacts)
}

fn has_suffix(name: &str, stem: &str, extensions: &[&str]) -> bool {
    extensions
        .iter()
        .any(|ext| name.ends_with(&format!("{stem}{ext}")))
}
