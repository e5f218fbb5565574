//! Config validation with field paths in every message.

use crate::schema::RuntimeConfig;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError { path: path.into(), message: message.into() });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError { path: path.into(), message: message.into() });
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

pub fn validate(config: &RuntimeConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_extension(config, &mut report);
    validate_updates(config, &mut report);
    validate_logging(config, &mut report);
    report
}

fn validate_extension(config: &RuntimeConfig, report: &mut ValidationReport) {
    let Some(ext) = &config.extension else {
        report.warn("extension", "No extension section; the manifest name is used as id");
        return;
    };
    match ext.id.as_deref() {
        None => report.warn("extension.id", "Extension id not set; the manifest name is used as id"),
        Some(id) if id.trim().is_empty() => report.error("extension.id", "Extension id must not be empty"),
        Some(_) => {}
    }
    if ext.listener_timeout_ms == Some(0) {
        report.error("extension.listener_timeout_ms", "Listener timeout must be greater than zero");
    }
    if let Some(version) = &ext.version {
        if version.trim().is_empty() {
            report.error("extension.version", "Version must not be empty when set");
        }
    }
}

fn validate_updates(config: &RuntimeConfig, report: &mut ValidationReport) {
    let Some(updates) = &config.updates else { return };
    if let Some(url) = &updates.url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            report.error("updates.url", format!("Update URL must be http(s), got '{url}'"));
        }
    }
    if updates.timeout_secs == Some(0) {
        report.error("updates.timeout_secs", "Timeout must be greater than zero");
    }
}

fn validate_logging(config: &RuntimeConfig, report: &mut ValidationReport) {
    let Some(logging) = &config.logging else { return };
    if let Some(level) = &logging.level {
        // Full EnvFilter directives such as "exthost_runtime=debug" are allowed.
        if !level.contains('=') && !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
            report.warn("logging.level", format!("Unknown log level '{level}'"));
        }
    }
}
