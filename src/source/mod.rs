//! Configuration sources.
//!
//! A [`ConfigSource`] exposes a flat key/value view of configuration and can
//! push [`ChangeEvent`]s to a [`ChangeListener`]. Two implementations exist:
//!
//! - [`YamlFileSource`]: YAML files and directories merged by per-file
//!   priority, hot-reloaded from the filesystem.
//! - [`MemorySource`]: values set programmatically, for tests and fakes.
//!
//! ## Priority
//! Every file is registered with a numeric priority. When two files define
//! the same key, the lower number wins. Equal priorities keep whichever file
//! defined the key first.

mod flatten;
mod memory;
mod reconcile;
mod registry;
mod store;
mod watcher;
mod yaml;

pub use flatten::{flatten, flatten_document, parse_yaml, parse_yaml_file};
pub use memory::MemorySource;
pub use reconcile::reconcile;
pub use registry::{FileEntry, FileRegistry};
pub use store::{ConfigEntry, ConfigStore, Entries};
pub use yaml::YamlFileSource;

use crate::error::SourceResult;
use crate::types::ChangeEvent;
use async_trait::async_trait;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Receives change events from a source.
///
/// Called synchronously from the thread that produced the event. A slow
/// listener delays every event behind it.
pub trait ChangeListener: Send + Sync {
    fn on_event(&self, event: &ChangeEvent);
}

impl<F> ChangeListener for F
where
    F: Fn(&ChangeEvent) + Send + Sync,
{
    fn on_event(&self, event: &ChangeEvent) {
        self(event)
    }
}

/// A source of flat key/value configuration.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Identifier used in emitted events.
    fn source_name(&self) -> &'static str;

    /// Precedence of this source among sibling sources.
    fn priority(&self) -> i32;

    /// Snapshot of every key and value.
    fn get_configurations(&self) -> SourceResult<BTreeMap<String, Value>>;

    /// Value for one key, or `KeyNotFound`.
    fn get_configuration_by_key(&self, key: &str) -> SourceResult<Value>;

    /// Register `listener` and start pushing changes to it.
    ///
    /// Replaces any previously registered listener.
    async fn dynamic_config_handler(&self, listener: Arc<dyn ChangeListener>)
    -> SourceResult<()>;

    /// Stop pushing changes and drop all state. Safe to call repeatedly.
    async fn cleanup(&self) -> SourceResult<()>;
}

/// A source backed by files on disk.
pub trait FileSource: ConfigSource {
    /// Add a YAML file, or every YAML file in a directory, at `priority`.
    fn add_file_source(&self, path: &Path, priority: u32) -> SourceResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventKind, SOURCE_NAME};

    #[test]
    fn test_closure_listener() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: Arc<dyn ChangeListener> = Arc::new(move |e: &ChangeEvent| {
            sink.lock().unwrap().push(e.key.clone());
        });

        listener.on_event(&ChangeEvent::create(SOURCE_NAME, "a", Value::from(1)));
        listener.on_event(&ChangeEvent::delete(SOURCE_NAME, "b", Value::from(2)));

        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            ChangeEvent::delete(SOURCE_NAME, "b", Value::from(2)).kind,
            EventKind::Delete
        );
    }
}
