use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

/// Snapshot of a module as carried by load/unload events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleState {
    pub id: String,
    /// Install path, if the loader reported one.
    #[serde(default)]
    pub path: Option<String>,
}

impl ModuleState {
    pub fn new(id: impl Into<String>, path: Option<String>) -> Self {
        Self { id: id.into(), path }
    }
}

/// Extension update metadata reported by an update source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionUpdate {
    pub version: String,
    /// User friendly version name if available.
    #[serde(default)]
    pub version_name: Option<String>,
}

impl ExtensionUpdate {
    pub fn new(version: impl Into<String>) -> Self {
        Self { version: version.into(), version_name: None }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.version_name = Some(name.into());
        self
    }
}

/// Status half of an [`UpdateCheck`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    NoUpdate,
    UpdateAvailable,
}

/// Result of an update check.
///
/// Serializes as `{ "status": ..., "details": ... }`; `details` is present
/// exactly when an update is available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "UpdateCheckWire", try_from = "UpdateCheckWire")]
pub enum UpdateCheck {
    NoUpdate,
    UpdateAvailable(ExtensionUpdate),
}

impl UpdateCheck {
    pub fn status(&self) -> UpdateStatus {
        match self {
            Self::NoUpdate => UpdateStatus::NoUpdate,
            Self::UpdateAvailable(_) => UpdateStatus::UpdateAvailable,
        }
    }

    pub fn details(&self) -> Option<&ExtensionUpdate> {
        match self {
            Self::NoUpdate => None,
            Self::UpdateAvailable(details) => Some(details),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::UpdateAvailable(_))
    }
}

#[derive(Serialize, Deserialize)]
struct UpdateCheckWire {
    status: UpdateStatus,
    #[serde(default)]
    details: Option<ExtensionUpdate>,
}

impl From<UpdateCheck> for UpdateCheckWire {
    fn from(check: UpdateCheck) -> Self {
        match check {
            UpdateCheck::NoUpdate => Self { status: UpdateStatus::NoUpdate, details: None },
            UpdateCheck::UpdateAvailable(details) => Self {
                status: UpdateStatus::UpdateAvailable,
                details: Some(details),
            },
        }
    }
}

impl TryFrom<UpdateCheckWire> for UpdateCheck {
    type Error = String;

    fn try_from(wire: UpdateCheckWire) -> Result<Self, Self::Error> {
        match (wire.status, wire.details) {
            (UpdateStatus::NoUpdate, None) => Ok(Self::NoUpdate),
            (UpdateStatus::UpdateAvailable, Some(details)) => Ok(Self::UpdateAvailable(details)),
            (UpdateStatus::NoUpdate, Some(_)) => Err("no_update must not carry details".into()),
            (UpdateStatus::UpdateAvailable, None) => {
                Err("update_available requires details".into())
            }
        }
    }
}

/// Host operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Mac,
    Windows,
    Linux,
}

/// Host CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arch {
    #[serde(rename = "arm")]
    Arm,
    #[serde(rename = "arm64")]
    Arm64,
    #[serde(rename = "x86-32")]
    X86_32,
    #[serde(rename = "x86-64")]
    X86_64,
}

/// Platform the host is running on. Immutable for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub os: Os,
    pub arch: Arch,
}

impl PlatformInfo {
    /// Detect the platform from the compile target.
    pub fn current() -> Result<Self, RuntimeError> {
        Self::from_target(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Map Rust target names (`std::env::consts`) onto the runtime's platform names.
    pub fn from_target(os: &str, arch: &str) -> Result<Self, RuntimeError> {
        let unsupported = || RuntimeError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        };
        let os_kind = match os {
            "macos" => Os::Mac,
            "windows" => Os::Windows,
            "linux" => Os::Linux,
            _ => return Err(unsupported()),
        };
        let arch_kind = match arch {
            "arm" => Arch::Arm,
            "aarch64" => Arch::Arm64,
            "x86" => Arch::X86_32,
            "x86_64" => Arch::X86_64,
            _ => return Err(unsupported()),
        };
        Ok(Self { os: os_kind, arch: arch_kind })
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mac => write!(f, "mac"),
            Self::Windows => write!(f, "windows"),
            Self::Linux => write!(f, "linux"),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arm => write!(f, "arm"),
            Self::Arm64 => write!(f, "arm64"),
            Self::X86_32 => write!(f, "x86-32"),
            Self::X86_64 => write!(f, "x86-64"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_platform_from_target() {
        let info = PlatformInfo::from_target("macos", "aarch64").unwrap();
        assert_eq!(info, PlatformInfo { os: Os::Mac, arch: Arch::Arm64 });

        let info = PlatformInfo::from_target("windows", "x86").unwrap();
        assert_eq!(info.arch, Arch::X86_32);

        let err = PlatformInfo::from_target("freebsd", "x86_64").unwrap_err();
        assert!(matches!(err, RuntimeError::UnsupportedPlatform { .. }));
        assert!(PlatformInfo::from_target("linux", "riscv64").is_err());
    }

    #[test]
    fn test_platform_serialization() {
        let info = PlatformInfo { os: Os::Linux, arch: Arch::X86_64 };
        assert_eq!(serde_json::to_value(info).unwrap(), json!({"os": "linux", "arch": "x86-64"}));
        assert_eq!(Arch::X86_32.to_string(), "x86-32");
        assert_eq!(Os::Mac.to_string(), "mac");
    }

    #[test]
    fn test_update_check_wire_shape() {
        let none = serde_json::to_value(UpdateCheck::NoUpdate).unwrap();
        assert_eq!(none, json!({"status": "no_update", "details": null}));

        let available = UpdateCheck::UpdateAvailable(ExtensionUpdate::new("2.0"));
        assert_eq!(
            serde_json::to_value(&available).unwrap(),
            json!({
                "status": "update_available",
                "details": {"version": "2.0", "version_name": null}
            })
        );
        assert_eq!(available.status(), UpdateStatus::UpdateAvailable);
        assert_eq!(available.details().map(|d| d.version.as_str()), Some("2.0"));
    }

    #[test]
    fn test_update_check_rejects_inconsistent_wire() {
        let bad = json!({"status": "update_available", "details": null});
        assert!(serde_json::from_value::<UpdateCheck>(bad).is_err());

        let bad = json!({"status": "no_update", "details": {"version": "1.0"}});
        assert!(serde_json::from_value::<UpdateCheck>(bad).is_err());

        let ok = json!({"status": "no_update"});
        assert_eq!(serde_json::from_value::<UpdateCheck>(ok).unwrap(), UpdateCheck::NoUpdate);
    }
}
