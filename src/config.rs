// Backup Center configuration
// Purpose: site layout, runtime root and the optional archive root override

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::errors::{BackupError, BackupResult};

pub const DEFAULT_ARCHIVE_DIRNAME: &str = "backup_manager/archive";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupCenterConfig {
    /// Site identifier, e.g. `erp.example.com`
    pub site: String,
    /// Runtime root the restore script enters before running commands
    pub bench_path: String,
    #[serde(default)]
    pub sites_dir: Option<String>,
    /// Sandbox root override; must resolve inside the site's private folder
    #[serde(default)]
    pub archive_path: Option<String>,
    #[serde(default = "default_bench_command")]
    pub bench_command: String,
    #[serde(default = "default_public_url")]
    pub public_url: String,
    #[serde(default)]
    pub store_path: Option<String>,
    #[serde(default = "default_listen")]
    pub listen: String,
}

pub fn default_bench_command() -> String {
    "bench".to_string()
}

pub fn default_public_url() -> String {
    "http://localhost:8000".to_string()
}

pub fn default_listen() -> String {
    "127.0.0.1:8085".to_string()
}

impl BackupCenterConfig {
    pub fn new(site: &str, bench_path: impl Into<PathBuf>) -> Self {
        Self {
            site: site.to_string(),
            bench_path: bench_path.into().to_string_lossy().to_string(),
            sites_dir: None,
            archive_path: None,
            bench_command: default_bench_command(),
            public_url: default_public_url(),
            store_path: None,
            listen: default_listen(),
        }
    }

    pub fn validate(&self) -> BackupResult<()> {
        if self.site.trim().is_empty() {
            return Err(BackupError::config("site cannot be empty"));
        }
        if self.site.contains('/') || self.site.contains("..") {
            return Err(BackupError::config("site must be a plain site name"));
        }
        if self.bench_path.trim().is_empty() {
            return Err(BackupError::config("bench_path cannot be empty"));
        }
        if self.bench_command.trim().is_empty() {
            return Err(BackupError::config("bench_command cannot be empty"));
        }
        Ok(())
    }

    pub fn bench_root(&self) -> PathBuf {
        PathBuf::from(&self.bench_path)
    }

    pub fn sites_root(&self) -> PathBuf {
        match &self.sites_dir {
            Some(dir) => PathBuf::from(dir),
            None => self.bench_root().join("sites"),
        }
    }

    /// `<sites>/<site>`
    pub fn site_root(&self) -> PathBuf {
        self.sites_root().join(&self.site)
    }

    pub fn private_root(&self) -> PathBuf {
        self.site_root().join("private")
    }

    /// Where files uploaded under `/files/` live.
    pub fn public_files_root(&self) -> PathBuf {
        self.site_root().join("public").join("files")
    }

    pub fn catalog_path(&self) -> PathBuf {
        match &self.store_path {
            Some(path) => PathBuf::from(path),
            None => self.private_root().join("backup_center").join("catalog"),
        }
    }

    /// Site name as used in directory stamps (`erp.example.com` -> `erp_example_com`).
    pub fn site_stamp(&self) -> String {
        self.site.replace('.', "_")
    }
}
