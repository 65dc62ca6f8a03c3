//! The archive engine: the single entry point for backup, catalog and
//! restore operations. Operation bodies live in `archive_builder`,
//! `catalog` and `restore_launcher`.

use std::sync::Arc;

use crate::archive_store::ArchiveStore;
use crate::archive_store_sled::ArchiveStoreSled;
use crate::config::BackupCenterConfig;
use crate::dump_generator::{BenchDumpGenerator, DumpGenerator};
use crate::errors::BackupResult;
use crate::path_sandbox::PathSandbox;

pub const DOWNLOAD_METHOD: &str = "/api/method/backup_center.download_archive_file";

pub struct ArchiveEngine {
    pub(crate) config: BackupCenterConfig,
    pub(crate) sandbox: PathSandbox,
    pub(crate) store: Arc<dyn ArchiveStore>,
    pub(crate) dumper: Arc<dyn DumpGenerator>,
}

impl ArchiveEngine {
    /// Build an engine from explicit collaborators. Resolves (and creates)
    /// the archive root once; a misplaced root is a configuration error.
    pub fn new(
        config: BackupCenterConfig,
        store: Arc<dyn ArchiveStore>,
        dumper: Arc<dyn DumpGenerator>,
    ) -> BackupResult<Self> {
        config.validate()?;
        let sandbox = PathSandbox::from_config(&config)?;
        Ok(Self {
            config,
            sandbox,
            store,
            dumper,
        })
    }

    /// Production wiring: sled catalog plus the bench-backed dump generator.
    pub fn from_config(config: BackupCenterConfig) -> BackupResult<Self> {
        config.validate()?;
        let store = ArchiveStoreSled::new(&config.catalog_path())?;
        let dumper = BenchDumpGenerator::new(config.clone());
        Self::new(config, Arc::new(store), Arc::new(dumper))
    }

    pub fn config(&self) -> &BackupCenterConfig {
        &self.config
    }

    pub fn sandbox(&self) -> &PathSandbox {
        &self.sandbox
    }

    pub fn store(&self) -> &Arc<dyn ArchiveStore> {
        &self.store
    }

    /// Download reference for a stored relative path.
    pub fn download_url(&self, rel_path: Option<&str>) -> Option<String> {
        let rel_path = rel_path.filter(|p| !p.is_empty())?;
        Some(format!(
            "{}{}?path={}",
            self.config.public_url.trim_end_matches('/'),
            DOWNLOAD_METHOD,
            urlencoding::encode(rel_path)
        ))
    }
}
