//! The authoritative key → (value, owning file) mapping.

use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A stored value and the file that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigEntry {
    pub value: Value,
    pub owner: PathBuf,
}

impl ConfigEntry {
    pub fn new(value: Value, owner: impl Into<PathBuf>) -> Self {
        Self {
            value,
            owner: owner.into(),
        }
    }
}

pub type Entries = BTreeMap<String, ConfigEntry>;

/// Flat configuration store.
///
/// Only reconciliation writes to it, by replacing the whole mapping.
#[derive(Debug, Default)]
pub struct ConfigStore {
    entries: Entries,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every key and value, without ownership.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|e| e.value.clone())
    }

    pub fn owner_of(&self, key: &str) -> Option<&Path> {
        self.entries.get(key).map(|e| e.owner.as_path())
    }

    pub fn entries(&self) -> &Entries {
        &self.entries
    }

    /// Swap in a reconciled mapping.
    pub fn replace(&mut self, entries: Entries) {
        self.entries = entries;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
