//! `exthost-config`: extension host configuration.
//!
//! Provides:
//! - Typed config schema (extension, updates, logging)
//! - YAML read/write with atomic backup rotation
//! - `${ENV_VAR}` substitution
//! - Default value application and validation

pub mod defaults;
pub mod env;
pub mod io;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{collect_referenced_vars, resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use io::{config_dir, config_file_path, load_config, write_config};
pub use schema::{ExtensionConfig, LoggingConfig, RuntimeConfig, UpdatesConfig};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;

/// Load, substitute env vars, apply defaults and validate.
///
/// Validation errors fail the load; warnings are logged.
pub async fn load_and_prepare(path: &Path) -> Result<RuntimeConfig> {
    let raw_config = load_config(path).await?;

    let value: Value =
        serde_json::to_value(&raw_config).context("Failed to serialize config for processing")?;
    let referenced = collect_referenced_vars(&value);
    if !referenced.is_empty() {
        tracing::debug!(vars = ?referenced, "Config references env vars");
    }
    let value = resolve_env_vars(&value).context("Failed to resolve env vars in config")?;
    let config: RuntimeConfig =
        serde_json::from_value(value).context("Failed to deserialize config after processing")?;

    let config = apply_all_defaults(config);

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    if let Some(first) = report.errors.first() {
        for error in &report.errors {
            tracing::error!(path = %error.path, message = %error.message, "Config error");
        }
        bail!("{first}");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_and_prepare_applies_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "extension:\n  id: demo\n  version: \"1.2\"\n").unwrap();

        let config = load_and_prepare(&path).await.unwrap();
        assert_eq!(config.extension_id(), Some("demo"));
        assert_eq!(config.log_level(), "info");
        assert_eq!(config.updates.unwrap().timeout_secs, Some(10));
    }

    #[tokio::test]
    async fn test_load_and_prepare_rejects_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "updates:\n  url: file:///tmp/u.json\n").unwrap();

        let err = load_and_prepare(&path).await.unwrap_err();
        assert!(err.to_string().contains("updates.url"));
    }
}
