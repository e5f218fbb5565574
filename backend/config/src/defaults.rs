//! Config defaults: applies default values to a parsed config.

use crate::schema::{ExtensionConfig, LoggingConfig, RuntimeConfig, UpdatesConfig};

/// Default tracing level filter.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default per-listener time limit (milliseconds).
pub const DEFAULT_LISTENER_TIMEOUT_MS: u64 = 10_000;

/// Default update request timeout (seconds).
pub const DEFAULT_UPDATE_TIMEOUT_SECS: u64 = 10;

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: RuntimeConfig) -> RuntimeConfig {
    let config = apply_extension_defaults(config);
    let config = apply_update_defaults(config);
    apply_logging_defaults(config)
}

fn apply_extension_defaults(mut config: RuntimeConfig) -> RuntimeConfig {
    let extension = config.extension.get_or_insert_with(ExtensionConfig::default);
    if extension.enabled.is_none() {
        extension.enabled = Some(true);
    }
    if extension.listener_timeout_ms.is_none() {
        extension.listener_timeout_ms = Some(DEFAULT_LISTENER_TIMEOUT_MS);
    }
    config
}

fn apply_update_defaults(mut config: RuntimeConfig) -> RuntimeConfig {
    let updates = config.updates.get_or_insert_with(UpdatesConfig::default);
    if updates.timeout_secs.is_none() {
        updates.timeout_secs = Some(DEFAULT_UPDATE_TIMEOUT_SECS);
    }
    config
}

fn apply_logging_defaults(mut config: RuntimeConfig) -> RuntimeConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    if logging.level.is_none() {
        logging.level = Some(DEFAULT_LOG_LEVEL.to_string());
    }
    if logging.dir.is_none() {
        logging.dir = Some(crate::io::config_dir().join("logs"));
    }
    config
}
