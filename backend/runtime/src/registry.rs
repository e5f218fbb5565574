/// Module registry: the single record of which modules are loaded.
///
/// Pure state: it never dispatches events itself. The runtime facade turns
/// each successful transition into the matching event.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use exthost_core::{ModuleState, RuntimeError, RuntimeResult};

/// Lifecycle state of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    Unloaded,
    Loaded,
}

/// A module known to the registry. Unloaded records are kept as history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub id: String,
    pub path: Option<String>,
    pub status: ModuleStatus,
    /// Number of times this module has been loaded.
    pub load_count: u32,
}

impl ModuleRecord {
    pub fn snapshot(&self) -> ModuleState {
        ModuleState::new(self.id.clone(), self.path.clone())
    }
}

#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, ModuleRecord>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition `id` to `Loaded`. Loading a loaded module is an error.
    pub fn load(&mut self, id: &str, path: Option<String>) -> RuntimeResult<ModuleState> {
        if id.is_empty() {
            return Err(RuntimeError::InvalidModuleId);
        }
        let record = self.modules.entry(id.to_string()).or_insert_with(|| ModuleRecord {
            id: id.to_string(),
            path: None,
            status: ModuleStatus::Unloaded,
            load_count: 0,
        });
        if record.status == ModuleStatus::Loaded {
            debug!(module = %id, "Rejected load of already loaded module");
            return Err(RuntimeError::AlreadyLoaded(id.to_string()));
        }

        record.path = path;
        record.status = ModuleStatus::Loaded;
        record.load_count += 1;
        info!(module = %id, path = ?record.path, loads = record.load_count, "Module loaded");
        Ok(record.snapshot())
    }

    /// Transition `id` to `Unloaded`, returning its pre-unload snapshot.
    pub fn unload(&mut self, id: &str) -> RuntimeResult<ModuleState> {
        match self.modules.get_mut(id) {
            Some(record) if record.status == ModuleStatus::Loaded => {
                let snapshot = record.snapshot();
                record.status = ModuleStatus::Unloaded;
                info!(module = %id, "Module unloaded");
                Ok(snapshot)
            }
            _ => Err(RuntimeError::NotLoaded(id.to_string())),
        }
    }

    /// Ids of all loaded modules, sorted.
    pub fn list(&self) -> Vec<String> {
        self.modules
            .values()
            .filter(|r| r.status == ModuleStatus::Loaded)
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&ModuleRecord> {
        self.modules.get(id)
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.get(id).is_some_and(|r| r.status == ModuleStatus::Loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_and_list() {
        let mut reg = ModuleRegistry::new();
        let state = reg.load("ui", Some("/ext/ui".into())).unwrap();
        assert_eq!(state, ModuleState::new("ui", Some("/ext/ui".into())));
        reg.load("background", None).unwrap();
        assert_eq!(reg.list(), vec!["background", "ui"]);
        assert!(reg.is_loaded("ui"));
    }

    #[test]
    fn test_double_load_is_error() {
        let mut reg = ModuleRegistry::new();
        reg.load("ui", Some("/a".into())).unwrap();
        let err = reg.load("ui", Some("/b".into())).unwrap_err();
        assert!(matches!(err, RuntimeError::AlreadyLoaded(id) if id == "ui"));
        // The original path is untouched.
        assert_eq!(reg.get("ui").unwrap().path.as_deref(), Some("/a"));
    }

    #[test]
    fn test_unload_returns_pre_unload_snapshot() {
        let mut reg = ModuleRegistry::new();
        reg.load("ui", Some("/ext/ui".into())).unwrap();
        let snapshot = reg.unload("ui").unwrap();
        assert_eq!(snapshot.path.as_deref(), Some("/ext/ui"));
        assert!(reg.list().is_empty());
        assert_eq!(reg.get("ui").unwrap().status, ModuleStatus::Unloaded);
    }

    #[test]
    fn test_unload_unknown_or_unloaded_is_error() {
        let mut reg = ModuleRegistry::new();
        assert!(matches!(reg.unload("ghost"), Err(RuntimeError::NotLoaded(_))));
        reg.load("ui", None).unwrap();
        reg.unload("ui").unwrap();
        assert!(matches!(reg.unload("ui"), Err(RuntimeError::NotLoaded(_))));
    }

    #[test]
    fn test_reload_after_unload() {
        let mut reg = ModuleRegistry::new();
        reg.load("ui", Some("/v1".into())).unwrap();
        reg.unload("ui").unwrap();
        let state = reg.load("ui", Some("/v2".into())).unwrap();
        assert_eq!(state.path.as_deref(), Some("/v2"));
        assert_eq!(reg.get("ui").unwrap().load_count, 2);
        assert_eq!(reg.list(), vec!["ui"]);
    }

    #[test]
    fn test_empty_id_rejected() {
        let mut reg = ModuleRegistry::new();
        assert!(matches!(reg.load("", None), Err(RuntimeError::InvalidModuleId)));
        assert!(reg.get("").is_none());
    }
}
