//! Path sandboxing for archive artifacts
//!
//! Every filesystem path the engine touches goes through [`PathSandbox`].
//! Stored paths are relative to the site's private-storage root; the archive
//! root (where new backups are written) is that root or one of its
//! descendants. Containment is checked component-wise after symlinks have
//! been resolved, so `private_evil/` is not mistaken for `private/`.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use url::Url;

use crate::config::{BackupCenterConfig, DEFAULT_ARCHIVE_DIRNAME};
use crate::errors::{BackupError, BackupResult};

/// Public URL prefix of files stored under the private root.
pub const PRIVATE_URL_PREFIX: &str = "/private/";
/// Public URL prefix of files stored under `public/files`.
pub const PUBLIC_FILES_URL_PREFIX: &str = "/files/";

const MAX_DIR_ATTEMPTS: u32 = 1000;

/// Resolves untrusted path input against the site's trusted storage roots.
#[derive(Debug, Clone)]
pub struct PathSandbox {
    site_root: PathBuf,
    private_root: PathBuf,
    public_files_root: PathBuf,
    archive_root: PathBuf,
    site_host: Option<String>,
}

impl PathSandbox {
    /// Resolve and create the archive root described by `config`.
    ///
    /// Fails with a configuration error when the archive root does not lie
    /// inside the private-storage root.
    pub fn from_config(config: &BackupCenterConfig) -> BackupResult<Self> {
        let site_root = normalize_path(&config.site_root())
            .map_err(|e| BackupError::io("resolving site root", e))?;
        let private_root = normalize_path(&config.private_root())
            .map_err(|e| BackupError::io("resolving private root", e))?;
        let public_files_root = normalize_path(&config.public_files_root())
            .map_err(|e| BackupError::io("resolving public files root", e))?;

        let configured = config
            .archive_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());
        let requested = match configured {
            Some(raw) => {
                let expanded = expand_home(raw);
                if expanded.is_absolute() {
                    expanded
                } else {
                    config.site_root().join(expanded)
                }
            }
            None => config.private_root().join(DEFAULT_ARCHIVE_DIRNAME),
        };

        let archive_root = normalize_path(&requested)
            .map_err(|e| BackupError::io("resolving archive root", e))?;
        if !archive_root.starts_with(&private_root) {
            return Err(BackupError::config(
                "Archive path must be inside the site's private folder.",
            ));
        }

        fs::create_dir_all(&archive_root)
            .map_err(|e| BackupError::io("creating archive root", e))?;

        // Re-check after creation: an existing symlink along the way may point elsewhere.
        let private_root = fs::canonicalize(&private_root)
            .map_err(|e| BackupError::io("canonicalizing private root", e))?;
        let archive_root = fs::canonicalize(&archive_root)
            .map_err(|e| BackupError::io("canonicalizing archive root", e))?;
        if !archive_root.starts_with(&private_root) {
            return Err(BackupError::config(
                "Archive path must be inside the site's private folder.",
            ));
        }

        let site_host = Url::parse(&config.public_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase));

        debug!(archive_root = %archive_root.display(), "archive root resolved");

        Ok(PathSandbox {
            site_root,
            private_root,
            public_files_root,
            archive_root,
            site_host,
        })
    }

    pub fn site_root(&self) -> &Path {
        &self.site_root
    }

    pub fn private_root(&self) -> &Path {
        &self.private_root
    }

    pub fn archive_root(&self) -> &Path {
        &self.archive_root
    }

    /// Resolve a stored (private-root-relative) path to an absolute path.
    ///
    /// Accepts the `/private/` URL form as well. Fails with `InvalidPath`
    /// when the result escapes the private root.
    pub fn resolve_relative(&self, rel_path: &str) -> BackupResult<PathBuf> {
        let cleaned = rel_path.trim();
        let cleaned = cleaned.strip_prefix(PRIVATE_URL_PREFIX).unwrap_or(cleaned);
        let cleaned = cleaned.trim_start_matches('/');

        let resolved = normalize_path(&self.private_root.join(cleaned))
            .map_err(|_| BackupError::invalid_path("Invalid archive path."))?;
        if !resolved.starts_with(&self.private_root) {
            return Err(BackupError::invalid_path("Invalid archive path."));
        }
        Ok(resolved)
    }

    /// Inverse of [`resolve_relative`](Self::resolve_relative).
    ///
    /// Returns a `/`-separated path relative to the private root, or an empty
    /// string for the root itself.
    pub fn to_relative(&self, path: &Path) -> BackupResult<String> {
        let resolved = normalize_path(path).map_err(|_| BackupError::OutsideSandbox)?;
        let rel = resolved
            .strip_prefix(&self.private_root)
            .map_err(|_| BackupError::OutsideSandbox)?;

        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        Ok(parts.join("/"))
    }

    pub fn to_relative_opt(&self, path: Option<&Path>) -> BackupResult<Option<String>> {
        path.map(|p| self.to_relative(p)).transpose()
    }

    /// Resolve the URL of a file uploaded to this site.
    ///
    /// Only `/private/...` and `/files/...` locations are accepted, either as
    /// bare paths or as http(s) URLs on this site's host.
    pub fn resolve_uploaded(&self, file_url: &str) -> BackupResult<PathBuf> {
        let trimmed = file_url.trim();
        if trimmed.is_empty() {
            return Err(BackupError::invalid_path("Invalid file path."));
        }

        let raw_path = match Url::parse(trimmed) {
            Ok(url) => self.url_path(&url)?,
            Err(_) => trimmed.to_string(),
        };

        let normalized = normalize_url_path(&raw_path)?;
        let (base, rest) = if let Some(rest) = normalized.strip_prefix(PRIVATE_URL_PREFIX) {
            (&self.private_root, rest)
        } else if let Some(rest) = normalized.strip_prefix(PUBLIC_FILES_URL_PREFIX) {
            (&self.public_files_root, rest)
        } else {
            return Err(BackupError::invalid_path(
                "Only files uploaded to this site can be restored.",
            ));
        };

        let abs_path = normalize_path(&base.join(rest))
            .map_err(|_| BackupError::invalid_path("Invalid file location."))?;
        if !abs_path.starts_with(base) || !abs_path.starts_with(&self.site_root) {
            return Err(BackupError::invalid_path("Invalid file location."));
        }
        if !abs_path.is_file() {
            return Err(BackupError::not_found("uploaded file", display_name(&abs_path)));
        }
        Ok(abs_path)
    }

    fn url_path(&self, url: &Url) -> BackupResult<String> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(BackupError::invalid_path(
                "Only files uploaded to this site can be restored.",
            ));
        }
        if let Some(expected) = &self.site_host {
            let host = url.host_str().map(str::to_lowercase);
            if host.as_deref() != Some(expected.as_str()) {
                return Err(BackupError::invalid_path(
                    "Only files uploaded to this site can be restored.",
                ));
            }
        }
        let decoded = urlencoding::decode(url.path())
            .map_err(|_| BackupError::invalid_path("Invalid file path."))?;
        Ok(decoded.into_owned())
    }

    /// Create a fresh directory under the archive root.
    ///
    /// `name` is used as-is when free; otherwise `_2`, `_3`, ... is appended.
    /// Returns the directory name actually used and its absolute path.
    pub fn create_operation_dir(&self, name: &str) -> BackupResult<(String, PathBuf)> {
        if name.is_empty() || name.contains('/') || name.contains("..") {
            return Err(BackupError::invalid_path("Invalid archive directory name."));
        }
        for attempt in 1..=MAX_DIR_ATTEMPTS {
            let candidate = if attempt == 1 {
                name.to_string()
            } else {
                format!("{name}_{attempt}")
            };
            let dir = self.archive_root.join(&candidate);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok((candidate, dir)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(BackupError::io("creating archive directory", e)),
            }
        }
        Err(BackupError::internal(format!(
            "no free archive directory for stamp {name}"
        )))
    }
}

/// Resolve `path` like `realpath`, tolerating components that do not exist yet.
///
/// Existing prefixes are canonicalized (symlinks followed); the missing tail
/// is appended lexically with `.` dropped and `..` popping.
pub fn normalize_path(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut resolved = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                resolved.push(name);
                if fs::symlink_metadata(&resolved).is_ok() {
                    match fs::canonicalize(&resolved) {
                        Ok(real) => resolved = real,
                        // dangling symlink: keep the lexical path
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }
    Ok(resolved)
}

/// Lexically normalize a URL path; `..` may not climb above `/`.
fn normalize_url_path(raw: &str) -> BackupResult<String> {
    if raw.contains('\0') {
        return Err(BackupError::invalid_path("Invalid file path."));
    }
    let mut parts: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(BackupError::invalid_path("Invalid file location."));
                }
            }
            other => parts.push(other),
        }
    }
    let mut normalized = format!("/{}", parts.join("/"));
    if raw.ends_with('/') && !parts.is_empty() {
        normalized.push('/');
    }
    Ok(normalized)
}

fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sandbox() -> (TempDir, BackupCenterConfig, PathSandbox) {
        let temp = TempDir::new().unwrap();
        let config = BackupCenterConfig::new("erp.example.com", temp.path());
        fs::create_dir_all(config.private_root()).unwrap();
        fs::create_dir_all(config.public_files_root()).unwrap();
        let sandbox = PathSandbox::from_config(&config).unwrap();
        (temp, config, sandbox)
    }

    #[test]
    fn expands_home_prefix_only() {
        assert_eq!(expand_home("private/archive"), PathBuf::from("private/archive"));
        assert_eq!(expand_home("/srv/x~/y"), PathBuf::from("/srv/x~/y"));
        assert_eq!(expand_home("~user/x"), PathBuf::from("~user/x"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~"), home);
            assert_eq!(expand_home("~/backups"), home.join("backups"));
        }
    }

    #[test]
    fn creates_default_archive_root() {
        let (_temp, _config, sandbox) = sandbox();
        assert!(sandbox.archive_root().is_dir());
        assert!(sandbox.archive_root().ends_with("backup_manager/archive"));
        assert!(sandbox.archive_root().starts_with(sandbox.private_root()));
    }

    #[test]
    fn rejects_archive_override_outside_private_root() {
        let temp = TempDir::new().unwrap();
        let mut config = BackupCenterConfig::new("erp.example.com", temp.path());
        config.archive_path = Some("public/backups".to_string());
        let err = PathSandbox::from_config(&config).unwrap_err();
        assert!(matches!(err, BackupError::Config { .. }));

        config.archive_path = Some("private/../../elsewhere".to_string());
        assert!(PathSandbox::from_config(&config).is_err());
    }

    #[test]
    fn accepts_relative_override_inside_private_root() {
        let temp = TempDir::new().unwrap();
        let mut config = BackupCenterConfig::new("erp.example.com", temp.path());
        config.archive_path = Some("private/nightly".to_string());
        let sandbox = PathSandbox::from_config(&config).unwrap();
        assert!(sandbox.archive_root().ends_with("private/nightly"));

        config.archive_path = Some("private".to_string());
        let sandbox = PathSandbox::from_config(&config).unwrap();
        assert_eq!(sandbox.archive_root(), sandbox.private_root());
    }

    #[test]
    fn resolve_relative_rejects_traversal() {
        let (_temp, _config, sandbox) = sandbox();
        for input in [
            "../site_config.json",
            "backup_manager/../../site_config.json",
            "/private/../../etc/passwd",
            "a/b/../../../x",
        ] {
            let err = sandbox.resolve_relative(input).unwrap_err();
            assert!(matches!(err, BackupError::InvalidPath { .. }), "{input}");
        }
    }

    #[test]
    fn resolve_relative_stays_under_root() {
        let (_temp, _config, sandbox) = sandbox();
        let resolved = sandbox
            .resolve_relative("backup_manager/archive/x/db.sql.gz")
            .unwrap();
        assert!(resolved.starts_with(sandbox.private_root()));

        let leading = sandbox.resolve_relative("//backup_manager/archive").unwrap();
        assert_eq!(leading, sandbox.archive_root());

        let url_form = sandbox.resolve_relative("/private/backup_manager/archive").unwrap();
        assert_eq!(url_form, sandbox.archive_root());
    }

    #[test]
    fn resolve_relative_rejects_sibling_sharing_prefix() {
        let (_temp, config, sandbox) = sandbox();
        fs::create_dir_all(config.site_root().join("private_evil")).unwrap();
        let err = sandbox.resolve_relative("../private_evil/x").unwrap_err();
        assert!(matches!(err, BackupError::InvalidPath { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn resolve_relative_rejects_symlink_escape() {
        let (temp, config, sandbox) = sandbox();
        let outside = temp.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("secret.sql"), b"x").unwrap();
        std::os::unix::fs::symlink(&outside, config.private_root().join("link")).unwrap();

        let err = sandbox.resolve_relative("link/secret.sql").unwrap_err();
        assert!(matches!(err, BackupError::InvalidPath { .. }));
    }

    #[test]
    fn to_relative_round_trips() {
        let (_temp, _config, sandbox) = sandbox();
        let (_, dir) = sandbox.create_operation_dir("20260101_000000_site").unwrap();
        let file = dir.join("db.sql.gz");
        fs::write(&file, b"dump").unwrap();

        let rel = sandbox.to_relative(&file).unwrap();
        assert_eq!(rel, "backup_manager/archive/20260101_000000_site/db.sql.gz");
        assert_eq!(sandbox.to_relative(&sandbox.resolve_relative(&rel).unwrap()).unwrap(), rel);
        assert_eq!(sandbox.to_relative(sandbox.private_root()).unwrap(), "");
    }

    #[test]
    fn to_relative_rejects_outside_paths() {
        let (temp, _config, sandbox) = sandbox();
        let err = sandbox.to_relative(&temp.path().join("elsewhere.sql")).unwrap_err();
        assert!(matches!(err, BackupError::OutsideSandbox));
    }

    #[test]
    fn resolve_uploaded_accepts_site_files() {
        let (_temp, config, sandbox) = sandbox();
        fs::create_dir_all(config.private_root().join("files")).unwrap();
        fs::write(config.private_root().join("files/db.sql.gz"), b"x").unwrap();
        fs::write(config.public_files_root().join("pub.tar"), b"y").unwrap();

        let private = sandbox.resolve_uploaded("/private/files/db.sql.gz").unwrap();
        assert!(private.starts_with(sandbox.private_root()));

        let public = sandbox.resolve_uploaded("files/pub.tar").unwrap();
        assert!(public.ends_with("public/files/pub.tar"));

        let via_url = sandbox
            .resolve_uploaded("http://localhost:8000/private/files/db.sql.gz")
            .unwrap();
        assert_eq!(via_url, private);
    }

    #[test]
    fn resolve_uploaded_rejects_foreign_locations() {
        let (_temp, config, sandbox) = sandbox();
        fs::write(config.site_root().join("site_config.json"), b"{}").unwrap();

        for input in [
            "",
            "/etc/passwd",
            "/private/../site_config.json",
            "/files/../../site_config.json",
            "file:///etc/passwd",
            "https://attacker.example/private/files/db.sql.gz",
        ] {
            let err = sandbox.resolve_uploaded(input).unwrap_err();
            assert!(matches!(err, BackupError::InvalidPath { .. }), "{input}");
        }
    }

    #[test]
    fn resolve_uploaded_reports_missing_file() {
        let (_temp, _config, sandbox) = sandbox();
        let err = sandbox.resolve_uploaded("/private/files/missing.sql").unwrap_err();
        assert!(matches!(err, BackupError::NotFound { .. }));
    }

    #[test]
    fn operation_dirs_never_collide() {
        let (_temp, _config, sandbox) = sandbox();
        let (first, _) = sandbox.create_operation_dir("20260101_000000_site").unwrap();
        let (second, _) = sandbox.create_operation_dir("20260101_000000_site").unwrap();
        let (third, _) = sandbox.create_operation_dir("20260101_000000_site").unwrap();
        assert_eq!(first, "20260101_000000_site");
        assert_eq!(second, "20260101_000000_site_2");
        assert_eq!(third, "20260101_000000_site_3");
        assert!(sandbox.create_operation_dir("../x").is_err());
    }

    #[test]
    fn normalize_path_handles_missing_tail() {
        let temp = TempDir::new().unwrap();
        let base = fs::canonicalize(temp.path()).unwrap();
        let normalized = normalize_path(&base.join("a/./b/../c")).unwrap();
        assert_eq!(normalized, base.join("a/c"));
    }
}
