// src/tests/test_utils.rs
// Shared fixtures: a throwaway site tree, a stub dump generator and a stub bench

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tempfile::TempDir;

use crate::archive_store_sled::ArchiveStoreSled;
use crate::config::BackupCenterConfig;
use crate::dump_generator::{DumpArtifacts, DumpGenerator, DumpRequest};
use crate::engine::ArchiveEngine;
use crate::errors::{BackupError, BackupResult};
use crate::loa::LOA;
use crate::request_context::RequestContext;

pub const SITE: &str = "erp.example.com";
/// Name that never resolves on `PATH`, so the `<bench>/env/bin` fallback is used.
pub const STUB_BENCH: &str = "bench-stub-backup-center";

/// Writes deterministic artifacts named the way `bench backup` names them.
#[derive(Default)]
pub struct StubDumpGenerator {
    pub calls: AtomicUsize,
}

impl DumpGenerator for StubDumpGenerator {
    fn generate(&self, request: &DumpRequest) -> BackupResult<DumpArtifacts> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let prefix = format!("2026010{}_000000-erp_example_com", n % 10);
        let write = |suffix: &str, body: &[u8]| -> BackupResult<PathBuf> {
            let path = request.target_dir.join(format!("{prefix}-{suffix}"));
            fs::write(&path, body).map_err(|e| BackupError::io("stub dump", e))?;
            Ok(path)
        };

        let mut artifacts = DumpArtifacts {
            db: Some(write("database.sql.gz", b"-- stub database dump\n")?),
            config: Some(write("site_config_backup.json", b"{\"db_name\": \"stub\"}")?),
            ..Default::default()
        };
        if !request.ignore_files {
            artifacts.public_files = Some(write("files.tar", b"public files")?);
            artifacts.private_files = Some(write("private-files.tar", b"private files")?);
        }
        Ok(artifacts)
    }
}

/// Always fails, as a dump would when the database is unreachable.
pub struct FailingDumpGenerator;

impl DumpGenerator for FailingDumpGenerator {
    fn generate(&self, _request: &DumpRequest) -> BackupResult<DumpArtifacts> {
        Err(BackupError::dump("mysqldump: Access denied"))
    }
}

/// Dumps normally, then squats on the bundle path with a directory so zipping fails.
pub struct BundleBlockingDumpGenerator;

impl DumpGenerator for BundleBlockingDumpGenerator {
    fn generate(&self, request: &DumpRequest) -> BackupResult<DumpArtifacts> {
        let db = request.target_dir.join("20260101_000000-erp_example_com-database.sql.gz");
        fs::write(&db, b"-- stub database dump\n").map_err(|e| BackupError::io("stub dump", e))?;
        let stamp = request
            .target_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        fs::create_dir_all(request.target_dir.join(format!("{stamp}_bundle.zip")))
            .map_err(|e| BackupError::io("stub dump", e))?;
        Ok(DumpArtifacts {
            db: Some(db),
            ..Default::default()
        })
    }
}

pub struct TestSite {
    pub temp: TempDir,
    pub config: BackupCenterConfig,
    pub engine: ArchiveEngine,
    pub dumper: Arc<StubDumpGenerator>,
}

impl TestSite {
    pub fn new() -> Self {
        let dumper = Arc::new(StubDumpGenerator::default());
        let (temp, config, engine) = Self::build(dumper.clone());
        TestSite {
            temp,
            config,
            engine,
            dumper,
        }
    }

    /// A site whose dump generator always fails.
    pub fn with_failing_dumper() -> (TempDir, ArchiveEngine) {
        Self::with_dumper(Arc::new(FailingDumpGenerator))
    }

    pub fn with_dumper(dumper: Arc<dyn DumpGenerator>) -> (TempDir, ArchiveEngine) {
        let (temp, _config, engine) = Self::build(dumper);
        (temp, engine)
    }

    fn build(dumper: Arc<dyn DumpGenerator>) -> (TempDir, BackupCenterConfig, ArchiveEngine) {
        let temp = TempDir::new().unwrap();
        let bench = temp.path().join("frappe-bench");
        let mut config = BackupCenterConfig::new(SITE, &bench);
        config.bench_command = STUB_BENCH.to_string();
        fs::create_dir_all(config.private_root().join("files")).unwrap();
        fs::create_dir_all(config.public_files_root()).unwrap();
        install_stub_bench(&bench);

        let store = ArchiveStoreSled::new(&config.catalog_path()).unwrap();
        let engine = ArchiveEngine::new(config.clone(), Arc::new(store), dumper).unwrap();
        (temp, config, engine)
    }

    pub fn root() -> RequestContext {
        RequestContext::new("Administrator", LOA::Root)
    }

    pub fn operator() -> RequestContext {
        RequestContext::new("ops@example.com", LOA::Operator)
    }

    pub fn dump_calls(&self) -> usize {
        self.dumper.calls.load(Ordering::SeqCst)
    }

    pub fn record_count(&self) -> usize {
        self.engine.store().list().unwrap().len()
    }

    /// Drop a file into the site's private files and return its site URL.
    pub fn upload_private(&self, name: &str, body: &[u8]) -> String {
        fs::write(self.config.private_root().join("files").join(name), body).unwrap();
        format!("/private/files/{name}")
    }

    pub fn upload_public(&self, name: &str, body: &[u8]) -> String {
        fs::write(self.config.public_files_root().join(name), body).unwrap();
        format!("/files/{name}")
    }

    pub fn bench_path(&self) -> PathBuf {
        self.config.bench_root()
    }

    pub fn remove_stub_bench(&self) {
        fs::remove_file(self.bench_path().join("env/bin").join(STUB_BENCH)).unwrap();
    }

    /// Argument lines the stub bench has seen, one entry per invocation.
    pub fn bench_calls(&self) -> Vec<String> {
        fs::read_to_string(self.bench_path().join("bench-calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Poll a restore log until the script has turned maintenance mode off.
    pub fn wait_for_restore(&self, log_rel: &str) -> String {
        let log = self.engine.sandbox().resolve_relative(log_rel).unwrap();
        wait_for_text(&log, "set-maintenance-mode off")
    }
}

pub fn wait_for_text(path: &Path, needle: &str) -> String {
    let mut text = String::new();
    for _ in 0..200 {
        text = fs::read_to_string(path).unwrap_or_default();
        if text.contains(needle) {
            return text;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    panic!("timed out waiting for {needle:?} in {}:\n{text}", path.display());
}

#[cfg(unix)]
fn install_stub_bench(bench: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let bin = bench.join("env/bin");
    fs::create_dir_all(&bin).unwrap();
    let stub = bin.join(STUB_BENCH);
    let calls = bench.join("bench-calls.log");
    fs::write(
        &stub,
        format!(
            "#!/bin/sh\nprintf '%s\\n' \"$*\" >> '{}'\necho \"bench $*\"\nexit 0\n",
            calls.display()
        ),
    )
    .unwrap();
    fs::set_permissions(&stub, fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(not(unix))]
fn install_stub_bench(bench: &Path) {
    fs::create_dir_all(bench.join("env/bin")).unwrap();
}
