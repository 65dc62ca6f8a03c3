use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::config::{default_bench_command, default_listen, default_public_url, BackupCenterConfig};
use crate::errors::{BackupError, BackupResult};

pub const CONFIG_ENV_VAR: &str = "BACKUP_CENTER_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "backup_center.toml";

#[derive(serde::Serialize)]
struct BackupCenterDefaults {
    bench_command: String,
    public_url: String,
    listen: String,
}

fn defaults() -> Figment {
    Figment::from(Serialized::defaults(BackupCenterDefaults {
        bench_command: default_bench_command(),
        public_url: default_public_url(),
        listen: default_listen(),
    }))
}

/// Load configuration: defaults, then the TOML file, then `BACKUP_CENTER_*` env vars.
pub fn load_config(path: Option<&str>) -> BackupResult<BackupCenterConfig> {
    let file = path
        .map(str::to_string)
        .or_else(|| std::env::var(CONFIG_ENV_VAR).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

    let figment = defaults()
        .merge(Toml::file(file))
        .merge(Env::prefixed("BACKUP_CENTER_").ignore(&["config"]));

    extract(figment)
}

/// Load configuration from an in-memory TOML document (no env layer).
pub fn load_config_from_str(toml: &str) -> BackupResult<BackupCenterConfig> {
    extract(defaults().merge(Toml::string(toml)))
}

fn extract(figment: Figment) -> BackupResult<BackupCenterConfig> {
    let config: BackupCenterConfig = figment
        .extract()
        .map_err(|e| BackupError::config(format!("Failed to load config: {e}")))?;
    config.validate()?;
    Ok(config)
}
