//! Core types shared by configuration sources.

use serde::Serialize;
use serde_yaml::Value;
use std::collections::BTreeMap;

/// Identifier carried by every event this source emits.
pub const SOURCE_NAME: &str = "FileSource";

/// Priority of the file source among sibling configuration sources.
pub const SOURCE_PRIORITY: i32 = 4;

/// Per-file priority used when none is given.
pub const DEFAULT_FILE_PRIORITY: u32 = 0;

/// Priority of an unregistered file. Loses every comparison.
pub const LOWEST_PRECEDENCE: u32 = u32::MAX;

/// Flat mapping from dotted key path to leaf value.
pub type FlatConfig = BTreeMap<String, Value>;

/// Kind of configuration change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Create => write!(f, "create"),
            EventKind::Update => write!(f, "update"),
            EventKind::Delete => write!(f, "delete"),
        }
    }
}

/// A single configuration change.
///
/// `value` is the new value for creates and updates, and the removed value
/// for deletes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub source: &'static str,
    pub key: String,
    pub kind: EventKind,
    pub value: Value,
}

impl ChangeEvent {
    pub fn create(source: &'static str, key: impl Into<String>, value: Value) -> Self {
        Self {
            source,
            key: key.into(),
            kind: EventKind::Create,
            value,
        }
    }

    pub fn update(source: &'static str, key: impl Into<String>, value: Value) -> Self {
        Self {
            source,
            key: key.into(),
            kind: EventKind::Update,
            value,
        }
    }

    pub fn delete(source: &'static str, key: impl Into<String>, old_value: Value) -> Self {
        Self {
            source,
            key: key.into(),
            kind: EventKind::Delete,
            value: old_value,
        }
    }
}

/// How a source path is handled by `add_file_source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSourceType {
    RegularFile,
    Directory,
    Invalid,
}

impl From<&std::fs::Metadata> for FileSourceType {
    fn from(meta: &std::fs::Metadata) -> Self {
        if meta.is_dir() {
            FileSourceType::Directory
        } else if meta.is_file() {
            FileSourceType::RegularFile
        } else {
            FileSourceType::Invalid
        }
    }
}
