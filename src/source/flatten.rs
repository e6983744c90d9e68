//! Flattening of nested YAML documents into dotted keys.
//!
//! `{db: {host: x, port: 5432}}` becomes `{"db.host": x, "db.port": 5432}`.
//! Any non-mapping value is a leaf, including sequences.

use crate::error::{SourceError, SourceResult};
use crate::types::FlatConfig;
use serde_yaml::{Mapping, Value};
use std::path::Path;
use tracing::warn;

/// Flatten a mapping, prefixing every key with `prefix` when non-empty.
pub fn flatten(prefix: &str, mapping: &Mapping) -> FlatConfig {
    let mut result = FlatConfig::new();
    flatten_into(prefix, mapping, &mut result);
    result
}

fn flatten_into(prefix: &str, mapping: &Mapping, out: &mut FlatConfig) {
    for (key, value) in mapping {
        let Some(segment) = key_segment(key) else {
            warn!(key = ?key, "Skipping non-scalar yaml key");
            continue;
        };

        let full_key = if prefix.is_empty() {
            segment
        } else {
            format!("{}.{}", prefix, segment)
        };

        match value {
            Value::Mapping(child) => flatten_into(&full_key, child, out),
            leaf => {
                out.insert(full_key, leaf.clone());
            }
        }
    }
}

/// Render a mapping key as a path segment. Non-scalar keys have no segment.
fn key_segment(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => None,
    }
}

/// Flatten a whole parsed document.
///
/// An empty document flattens to nothing; any other non-mapping document is
/// rejected.
pub fn flatten_document(path: &Path, document: Value) -> SourceResult<FlatConfig> {
    match document {
        Value::Null => Ok(FlatConfig::new()),
        Value::Mapping(mapping) => Ok(flatten("", &mapping)),
        other => Err(SourceError::InvalidDocument {
            path: path.to_path_buf(),
            found: value_kind(&other),
        }),
    }
}

/// Parse YAML text and flatten it.
pub fn parse_yaml(path: &Path, content: &str) -> SourceResult<FlatConfig> {
    let document: Value = serde_yaml::from_str(content).map_err(|source| SourceError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    flatten_document(path, document)
}

/// Read a YAML file from disk and flatten it.
pub fn parse_yaml_file(path: &Path) -> SourceResult<FlatConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SourceError::io(path, e))?;
    parse_yaml(path, &content)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
