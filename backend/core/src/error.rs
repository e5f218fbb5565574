use thiserror::Error;

/// Top-level error type for the extension runtime host.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("module already loaded: {0}")]
    AlreadyLoaded(String),

    #[error("module not loaded: {0}")]
    NotLoaded(String),

    #[error("module id must not be empty")]
    InvalidModuleId,

    #[error("permission key must not be empty (module '{0}')")]
    InvalidPermission(String),

    #[error("permission denied: module '{module}' lacks '{permission}'")]
    PermissionDenied { module: String, permission: String },

    #[error("unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("reload request rejected: {0}")]
    ReloadRejected(String),

    #[error("message rejected by transport: {0}")]
    MessageRejected(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
