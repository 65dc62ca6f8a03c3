//! Locating the site management executable (`bench`).

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::BackupCenterConfig;
use crate::errors::{BackupError, BackupResult};

/// First match on `PATH`, else `<bench_path>/env/bin/<command>`.
///
/// A command containing a path separator is taken as an explicit path.
pub fn locate_bench(config: &BackupCenterConfig) -> BackupResult<PathBuf> {
    let command = config.bench_command.trim();

    let found = if command.contains('/') {
        let explicit = PathBuf::from(command);
        is_executable(&explicit).then_some(explicit)
    } else {
        find_in_path(command).or_else(|| {
            let fallback = config.bench_root().join("env").join("bin").join(command);
            is_executable(&fallback).then_some(fallback)
        })
    };

    match found {
        Some(path) => {
            debug!(bench = %path.display(), "bench executable located");
            Ok(path)
        }
        None => Err(BackupError::validation(
            "bench_command",
            "Bench command not found in PATH.",
        )),
    }
}

/// Search `PATH` the way a shell would.
pub fn find_in_path(command: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(command))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
