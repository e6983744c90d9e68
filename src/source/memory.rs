//! In-memory configuration source.
//!
//! Holds values set directly by the caller and reports every change to the
//! registered listener, like a file source without the filesystem.

use super::{ChangeListener, ConfigSource, lock};
use crate::error::{SourceError, SourceResult};
use crate::types::{ChangeEvent, FlatConfig};
use async_trait::async_trait;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Source name used by [`MemorySource::new`].
pub const MEMORY_SOURCE_NAME: &str = "MemorySource";

/// A [`ConfigSource`] backed by a map.
pub struct MemorySource {
    name: &'static str,
    priority: i32,
    values: Mutex<FlatConfig>,
    listener: Mutex<Option<Arc<dyn ChangeListener>>>,
}

impl MemorySource {
    pub fn new(priority: i32) -> Self {
        Self::with_name(MEMORY_SOURCE_NAME, priority)
    }

    pub fn with_name(name: &'static str, priority: i32) -> Self {
        Self {
            name,
            priority,
            values: Mutex::new(FlatConfig::new()),
            listener: Mutex::new(None),
        }
    }

    /// Set `key`, emitting a create or update. Setting an equal value is silent.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();

        let event = {
            let mut values = lock(&self.values);
            match values.insert(key.clone(), value.clone()) {
                None => Some(ChangeEvent::create(self.name, key, value)),
                Some(old) if old == value => None,
                Some(_) => Some(ChangeEvent::update(self.name, key, value)),
            }
        };

        if let Some(event) = event {
            self.emit(&event);
        }
    }

    /// Remove `key`, emitting a delete carrying the old value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let old = lock(&self.values).remove(key)?;
        self.emit(&ChangeEvent::delete(self.name, key, old.clone()));
        Some(old)
    }

    fn emit(&self, event: &ChangeEvent) {
        let listener = lock(&self.listener).clone();
        if let Some(listener) = listener {
            listener.on_event(event);
        }
    }
}

#[async_trait]
impl ConfigSource for MemorySource {
    fn source_name(&self) -> &'static str {
        self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn get_configurations(&self) -> SourceResult<BTreeMap<String, Value>> {
        Ok(lock(&self.values).clone())
    }

    fn get_configuration_by_key(&self, key: &str) -> SourceResult<Value> {
        lock(&self.values)
            .get(key)
            .cloned()
            .ok_or_else(|| SourceError::KeyNotFound(key.to_string()))
    }

    async fn dynamic_config_handler(
        &self,
        listener: Arc<dyn ChangeListener>,
    ) -> SourceResult<()> {
        *lock(&self.listener) = Some(listener);
        Ok(())
    }

    async fn cleanup(&self) -> SourceResult<()> {
        lock(&self.listener).take();
        lock(&self.values).clear();
        Ok(())
    }
}
