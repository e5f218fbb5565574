/// Extension manifest handle.
///
/// The runtime treats the manifest as an opaque JSON document; only a few
/// well-known fields (`name`, `version`, `version_name`) are read here.
use std::path::Path;

use serde_json::Value;
use tracing::info;

use exthost_core::{RuntimeError, RuntimeResult};

#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionManifest {
    raw: Value,
}

impl ExtensionManifest {
    pub fn from_value(raw: Value) -> RuntimeResult<Self> {
        let manifest = Self { raw };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Read and parse a JSON manifest from disk.
    pub async fn load(path: &Path) -> RuntimeResult<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            RuntimeError::Manifest(format!("read {}: {e}", path.display()))
        })?;
        let raw: Value = serde_json::from_str(&text).map_err(|e| {
            RuntimeError::Manifest(format!("parse {}: {e}", path.display()))
        })?;
        let manifest = Self::from_value(raw)?;
        info!(
            path = %path.display(),
            name = ?manifest.name(),
            version = ?manifest.version(),
            "Loaded extension manifest"
        );
        Ok(manifest)
    }

    /// Validate the manifest shape.
    pub fn validate(&self) -> RuntimeResult<()> {
        let Some(obj) = self.raw.as_object() else {
            return Err(RuntimeError::Manifest("manifest must be a JSON object".into()));
        };
        for key in ["name", "version"] {
            match obj.get(key) {
                None | Some(Value::String(_)) => {}
                Some(_) => {
                    return Err(RuntimeError::Manifest(format!("'{key}' must be a string")));
                }
            }
        }
        Ok(())
    }

    pub fn name(&self) -> Option<&str> {
        self.raw.get("name").and_then(Value::as_str)
    }

    pub fn version(&self) -> Option<&str> {
        self.raw.get("version").and_then(Value::as_str)
    }

    pub fn version_name(&self) -> Option<&str> {
        self.raw.get("version_name").and_then(Value::as_str)
    }

    pub fn as_value(&self) -> &Value {
        &self.raw
    }
}

impl Default for ExtensionManifest {
    fn default() -> Self {
        Self { raw: Value::Object(Default::default()) }
    }
}
