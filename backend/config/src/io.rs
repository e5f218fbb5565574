//! Config file read/write with atomic backup rotation.

use crate::schema::RuntimeConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const CONFIG_FILE_NAME: &str = "config.yaml";

/// Number of rolling backups to keep.
const MAX_BACKUPS: usize = 3;

/// Resolve the config directory.
/// Priority: `EXTHOST_CONFIG_DIR` env > `~/.exthost/`
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("EXTHOST_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".exthost"),
        None => PathBuf::from(".exthost"),
    }
}

pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE_NAME)
}

/// Load and parse the config from disk.
///
/// A missing file is not an error: the empty config is returned and
/// defaults fill it in later.
pub async fn load_config(path: &Path) -> Result<RuntimeConfig> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(RuntimeConfig::default());
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(RuntimeConfig::default());
    }

    let config: RuntimeConfig = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse config YAML at: {}", path.display()))?;

    info!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Persist `config` as YAML.
///
/// The YAML is written next to the target and renamed over it, so readers
/// never see a partial file. An existing file is first kept as
/// `config.yaml.bak.1`, shifting older backups up to `MAX_BACKUPS`.
pub async fn write_config(config: &RuntimeConfig, path: &Path) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }
    if fs::try_exists(path).await.unwrap_or(false) {
        keep_backup(path).await;
    }

    let staged = path.with_extension("yaml.tmp");
    fs::write(&staged, yaml)
        .await
        .with_context(|| format!("Failed to stage config at {}", staged.display()))?;
    fs::rename(&staged, path)
        .await
        .with_context(|| format!("Failed to move staged config to {}", path.display()))?;

    info!(path = %path.display(), "Wrote config");
    Ok(())
}

fn backup_path(path: &Path, generation: usize) -> PathBuf {
    path.with_extension(format!("yaml.bak.{generation}"))
}

/// Backup failures are logged; they never block the write itself.
async fn keep_backup(path: &Path) {
    for generation in (1..MAX_BACKUPS).rev() {
        let older = backup_path(path, generation);
        if !fs::try_exists(&older).await.unwrap_or(false) {
            continue;
        }
        if let Err(e) = fs::rename(&older, backup_path(path, generation + 1)).await {
            warn!(backup = %older.display(), error = %e, "Failed to shift config backup");
        }
    }
    if let Err(e) = fs::copy(path, backup_path(path, 1)).await {
        warn!(path = %path.display(), error = %e, "Failed to back up config");
    }
}
