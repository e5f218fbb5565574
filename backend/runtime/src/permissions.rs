//! Permission Ledger
//!
//! Authoritative map of module → granted permission keys. Grants are plain
//! string keys scoped to one module; a module with no grants is not listed.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use exthost_core::{RuntimeError, RuntimeResult};

#[derive(Debug, Default)]
pub struct PermissionLedger {
    grants: BTreeMap<String, BTreeSet<String>>,
}

impl PermissionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `permission` to `module`. Returns false if it was already granted.
    pub fn grant(&mut self, module: &str, permission: &str) -> RuntimeResult<bool> {
        validate_grant(module, permission)?;
        let added = self
            .grants
            .entry(module.to_string())
            .or_default()
            .insert(permission.to_string());
        debug!(module = %module, permission = %permission, added, "Permission grant");
        Ok(added)
    }

    /// Revoke `permission` from `module`. Returns false if it was not granted.
    pub fn revoke(&mut self, module: &str, permission: &str) -> bool {
        let Some(set) = self.grants.get_mut(module) else {
            return false;
        };
        let removed = set.remove(permission);
        if set.is_empty() {
            self.grants.remove(module);
        }
        debug!(module = %module, permission = %permission, removed, "Permission revoke");
        removed
    }

    /// Remove every grant held by `module`, returning the removed keys in order.
    pub fn revoke_all(&mut self, module: &str) -> Vec<String> {
        self.grants
            .remove(module)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn is_granted(&self, module: &str, permission: &str) -> bool {
        self.grants.get(module).is_some_and(|set| set.contains(permission))
    }

    /// Asserts the module holds `permission` before a sensitive call.
    pub fn check(&self, module: &str, permission: &str) -> RuntimeResult<()> {
        if !self.is_granted(module, permission) {
            warn!(module = %module, permission = %permission, "Permission denied");
            return Err(RuntimeError::PermissionDenied {
                module: module.to_string(),
                permission: permission.to_string(),
            });
        }
        Ok(())
    }

    /// Snapshot of all non-empty grant sets.
    pub fn get_all(&self) -> BTreeMap<String, Vec<String>> {
        self.grants
            .iter()
            .map(|(module, set)| (module.clone(), set.iter().cloned().collect()))
            .collect()
    }
}

/// Rejects empty module ids and permission keys.
pub(crate) fn validate_grant(module: &str, permission: &str) -> RuntimeResult<()> {
    if module.is_empty() {
        return Err(RuntimeError::InvalidModuleId);
    }
    if permission.is_empty() {
        return Err(RuntimeError::InvalidPermission(module.to_string()));
    }
    Ok(())
}
