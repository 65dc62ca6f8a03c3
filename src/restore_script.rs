//! Restore Script Generator
//!
//! Produces a self-contained bash procedure that puts the site into
//! maintenance mode, restores, migrates and always leaves maintenance mode,
//! even when a step fails. Commands are built as token lists; each token is
//! quoted on its own with [`shell_quote`] and never spliced into a
//! pre-formatted string.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde::Deserialize;

use crate::errors::{BackupError, BackupResult};

const MASK: &str = "********";

/// Quote a single token for POSIX shells.
///
/// Tokens made only of characters the shell never interprets are returned
/// unchanged; everything else is single-quoted with embedded `'` written as
/// `'\''`.
pub fn shell_quote(token: &str) -> String {
    if token.is_empty() {
        return "''".to_string();
    }
    let safe = token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '-' | '_'));
    if safe {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', r"'\''"))
    }
}

/// A command as a list of argv tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct ShellCommand {
    tokens: Vec<String>,
    secret: Vec<bool>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            tokens: vec![program.into()],
            secret: vec![false],
        }
    }

    pub fn arg(mut self, token: impl Into<String>) -> Self {
        self.tokens.push(token.into());
        self.secret.push(false);
        self
    }

    /// `flag value` when `value` is present and non-empty.
    pub fn opt(self, flag: &str, value: Option<&str>) -> Self {
        match value.filter(|v| !v.is_empty()) {
            Some(v) => self.arg(flag).arg(v),
            None => self,
        }
    }

    /// Like [`opt`](Self::opt) but the value is masked by [`render_masked`](Self::render_masked).
    pub fn secret_opt(mut self, flag: &str, value: Option<&str>) -> Self {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            self = self.arg(flag);
            self.tokens.push(v.to_string());
            self.secret.push(true);
        }
        self
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn render(&self) -> String {
        self.tokens
            .iter()
            .map(|t| shell_quote(t))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn render_masked(&self) -> String {
        self.tokens
            .iter()
            .zip(&self.secret)
            .map(|(t, secret)| if *secret { MASK.to_string() } else { shell_quote(t) })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Optional credentials passed through to the restore command.
#[derive(Clone, Default, Deserialize)]
pub struct RestoreCredentials {
    #[serde(default)]
    pub db_root_username: Option<String>,
    #[serde(default)]
    pub db_root_password: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
}

impl fmt::Debug for RestoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| v.as_ref().map(|_| MASK);
        f.debug_struct("RestoreCredentials")
            .field("db_root_username", &self.db_root_username)
            .field("db_root_password", &mask(&self.db_root_password))
            .field("admin_password", &mask(&self.admin_password))
            .finish()
    }
}

/// Everything the generated script needs.
#[derive(Debug, Clone)]
pub struct RestorePlan {
    bench_path: String,
    bench_cmd: String,
    site: String,
    db_path: String,
    public_path: Option<String>,
    private_path: Option<String>,
    credentials: RestoreCredentials,
}

fn path_token(field: &str, path: &Path) -> BackupResult<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| BackupError::validation(field, "path is not valid UTF-8"))
}

impl RestorePlan {
    pub fn new(
        bench_path: &Path,
        bench_cmd: &Path,
        site: &str,
        db_path: &Path,
        public_path: Option<&Path>,
        private_path: Option<&Path>,
        credentials: RestoreCredentials,
    ) -> BackupResult<Self> {
        if site.is_empty() {
            return Err(BackupError::validation("site", "site cannot be empty"));
        }
        Ok(Self {
            bench_path: path_token("bench_path", bench_path)?,
            bench_cmd: path_token("bench_cmd", bench_cmd)?,
            site: site.to_string(),
            db_path: path_token("db_path", db_path)?,
            public_path: public_path.map(|p| path_token("public_path", p)).transpose()?,
            private_path: private_path.map(|p| path_token("private_path", p)).transpose()?,
            credentials,
        })
    }

    fn site_command(&self) -> ShellCommand {
        ShellCommand::new(&self.bench_cmd).arg("--site").arg(&self.site)
    }

    pub fn maintenance_command(&self, on: bool) -> ShellCommand {
        self.site_command()
            .arg("set-maintenance-mode")
            .arg(if on { "on" } else { "off" })
    }

    pub fn restore_command(&self) -> ShellCommand {
        self.site_command()
            .arg("restore")
            .arg(&self.db_path)
            .arg("--force")
            .opt("--db-root-username", self.credentials.db_root_username.as_deref())
            .secret_opt("--db-root-password", self.credentials.db_root_password.as_deref())
            .secret_opt("--admin-password", self.credentials.admin_password.as_deref())
            .opt("--with-public-files", self.public_path.as_deref())
            .opt("--with-private-files", self.private_path.as_deref())
    }

    pub fn migrate_command(&self) -> ShellCommand {
        self.site_command().arg("migrate")
    }

    fn render_with(&self, render: impl Fn(&ShellCommand) -> String) -> String {
        let off = render(&self.maintenance_command(false));
        let lines = [
            "#!/usr/bin/env bash".to_string(),
            "set -euo pipefail".to_string(),
            format!("cd {}", shell_quote(&self.bench_path)),
            "cleanup() {".to_string(),
            "  status=$?".to_string(),
            format!("  {off} || true"),
            "  exit \"$status\"".to_string(),
            "}".to_string(),
            "trap cleanup EXIT".to_string(),
            render(&self.maintenance_command(true)),
            render(&self.restore_command()),
            render(&self.migrate_command()),
            off,
        ];
        let mut script = lines.join("\n");
        script.push('\n');
        script
    }

    pub fn render(&self) -> String {
        self.render_with(ShellCommand::render)
    }

    /// The script with passwords replaced, for display.
    pub fn render_masked(&self) -> String {
        self.render_with(ShellCommand::render_masked)
    }

    /// Write the script readable/executable by the owner only (0700).
    pub fn write_to(&self, script_path: &Path) -> BackupResult<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o700);
        }
        let mut file = options
            .open(script_path)
            .map_err(|e| BackupError::io("creating restore script", e))?;
        file.write_all(self.render().as_bytes())
            .map_err(|e| BackupError::io("writing restore script", e))?;
        file.sync_all()
            .map_err(|e| BackupError::io("syncing restore script", e))?;
        drop(file);

        // the mode passed to open() is ignored for a file that already existed
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(script_path, fs::Permissions::from_mode(0o700))
                .map_err(|e| BackupError::io("restricting restore script", e))?;
        }
        Ok(())
    }
}
