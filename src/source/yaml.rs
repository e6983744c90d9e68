//! YAML file source.
//!
//! Accepts files and directories:
//! - **File**: the file is parsed, flattened and registered.
//! - **Directory**: every `.yaml`/`.yml` file directly inside it is added
//!   (non-recursive). Files that fail are logged and skipped.
//!
//! Paths are canonicalized before registration so the same file reached
//! through different relative paths is only registered once.

use super::flatten::parse_yaml_file;
use super::reconcile::reconcile;
use super::registry::{FileEntry, FileRegistry};
use super::store::ConfigStore;
use super::watcher::WatchHandle;
use super::{ChangeListener, ConfigSource, FileSource, lock};
use crate::error::{SourceError, SourceResult};
use crate::types::{ChangeEvent, FileSourceType, FlatConfig, SOURCE_NAME, SOURCE_PRIORITY};
use async_trait::async_trait;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Store and registry, shared with the watch loop.
///
/// Lock order is store, then registry.
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    store: Mutex<ConfigStore>,
    registry: Mutex<FileRegistry>,
}

impl SharedState {
    pub(crate) fn register(&self, path: &Path, priority: u32) {
        lock(&self.registry).register(path, priority);
    }

    pub(crate) fn is_registered(&self, path: &Path) -> bool {
        lock(&self.registry).exists(path)
    }

    /// Run one reconciliation pass with the store locked throughout.
    pub(crate) fn reconcile_file(&self, path: &Path, new_conf: FlatConfig) -> Vec<ChangeEvent> {
        let mut store = lock(&self.store);
        let registry = lock(&self.registry);
        reconcile(&mut store, &registry, new_conf, path)
    }

    fn files(&self) -> Vec<PathBuf> {
        lock(&self.registry).files().map(Path::to_path_buf).collect()
    }

    fn clear(&self) {
        lock(&self.store).clear();
        lock(&self.registry).clear();
    }
}

/// Configuration source backed by YAML files with hot-reload.
///
/// # Example
/// ```no_run
/// use std::path::Path;
/// use yaml_file_source::source::{ConfigSource, FileSource, YamlFileSource};
///
/// let source = YamlFileSource::new();
/// source.add_file_source(Path::new("conf/base.yaml"), 1)?;
/// source.add_file_source(Path::new("conf.d"), 0)?;
/// let host = source.get_configuration_by_key("db.host")?;
/// # Ok::<(), yaml_file_source::error::SourceError>(())
/// ```
#[derive(Default)]
pub struct YamlFileSource {
    shared: Arc<SharedState>,
    watch: Mutex<Option<WatchHandle>>,
    /// Serializes teardown against registration.
    lifecycle: Mutex<()>,
}

impl YamlFileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered files in registration order.
    pub fn registered_files(&self) -> Vec<FileEntry> {
        lock(&self.shared.registry).entries().to_vec()
    }

    /// The file that currently owns `key`.
    pub fn owner_of(&self, key: &str) -> Option<PathBuf> {
        lock(&self.shared.store).owner_of(key).map(Path::to_path_buf)
    }

    /// Whether a watch loop is running.
    ///
    /// False after a watcher error ended the loop, until
    /// `dynamic_config_handler` is called again.
    pub fn is_watching(&self) -> bool {
        lock(&self.watch).as_ref().is_some_and(WatchHandle::is_running)
    }

    fn handle_directory(&self, dir: &Path, priority: u32) -> SourceResult<Vec<PathBuf>> {
        let entries = std::fs::read_dir(dir).map_err(|e| SourceError::io(dir, e))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    error!(dir = %dir.display(), "Failed to read directory entry: {}", e);
                    None
                }
            })
            .filter(|path| is_yaml_file(path) && path.is_file())
            .collect();
        files.sort();

        let mut added = Vec::with_capacity(files.len());
        for file in files {
            match self.handle_file(&file, priority) {
                Ok(()) => added.push(file),
                Err(e) => {
                    error!(path = %file.display(), "Error processing file source: {}", e);
                }
            }
        }

        info!(dir = %dir.display(), files = added.len(), "Added directory file source");
        Ok(added)
    }

    fn handle_file(&self, path: &Path, priority: u32) -> SourceResult<()> {
        let new_conf = parse_yaml_file(path)?;

        self.shared.register(path, priority);
        let events = self.shared.reconcile_file(path, new_conf);
        debug!(path = %path.display(), priority, events = events.len(), "Added file source");

        self.forward(&events);
        Ok(())
    }

    fn forward(&self, events: &[ChangeEvent]) {
        if events.is_empty() {
            return;
        }
        let listener = lock(&self.watch).as_ref().map(WatchHandle::listener);
        if let Some(listener) = listener {
            for event in events {
                listener.on_event(event);
            }
        }
    }
}

fn is_yaml_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Resolve `path` to a canonical absolute path.
fn resolve_path(path: &Path) -> SourceResult<PathBuf> {
    std::fs::canonicalize(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
            SourceError::FileNotFound(absolute)
        } else {
            SourceError::io(path, e)
        }
    })
}

impl FileSource for YamlFileSource {
    fn add_file_source(&self, path: &Path, priority: u32) -> SourceResult<()> {
        let _lifecycle = lock(&self.lifecycle);

        let path = resolve_path(path)?;

        if self.shared.is_registered(&path) {
            debug!(path = %path.display(), "File source already added");
            return Ok(());
        }

        let metadata = std::fs::metadata(&path).map_err(|e| SourceError::io(&path, e))?;
        let added = match FileSourceType::from(&metadata) {
            FileSourceType::Directory => self.handle_directory(&path, priority).inspect_err(|e| {
                error!(path = %path.display(), "Failed to handle directory: {}", e);
            })?,
            FileSourceType::RegularFile => {
                self.handle_file(&path, priority).inspect_err(|e| {
                    error!(path = %path.display(), "Failed to handle file: {}", e);
                })?;
                vec![path.clone()]
            }
            FileSourceType::Invalid => {
                error!(path = %path.display(), "File type not supported");
                return Err(SourceError::UnsupportedFileType(path));
            }
        };

        if let Some(watch) = lock(&self.watch).as_ref() {
            if watch.is_running() {
                for file in &added {
                    watch.add_watch_file(file);
                }
            } else {
                warn!(
                    path = %path.display(),
                    "File watcher is not running, changes to this source are not followed"
                );
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ConfigSource for YamlFileSource {
    fn source_name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn priority(&self) -> i32 {
        SOURCE_PRIORITY
    }

    fn get_configurations(&self) -> SourceResult<BTreeMap<String, Value>> {
        Ok(lock(&self.shared.store).snapshot())
    }

    fn get_configuration_by_key(&self, key: &str) -> SourceResult<Value> {
        lock(&self.shared.store)
            .get(key)
            .ok_or_else(|| SourceError::KeyNotFound(key.to_string()))
    }

    async fn dynamic_config_handler(
        &self,
        listener: Arc<dyn ChangeListener>,
    ) -> SourceResult<()> {
        let previous = {
            let _lifecycle = lock(&self.lifecycle);
            lock(&self.watch).take()
        };
        if let Some(previous) = previous {
            debug!("Replacing existing file watcher");
            previous.shutdown().await;
        }

        // Files registered from here on either make it into `files` or see
        // the new handle and subscribe themselves.
        let displaced = {
            let _lifecycle = lock(&self.lifecycle);
            let files = self.shared.files();
            let handle = WatchHandle::start(Arc::clone(&self.shared), listener, &files)?;
            lock(&self.watch).replace(handle)
        };
        if let Some(displaced) = displaced {
            displaced.shutdown().await;
        }

        Ok(())
    }

    async fn cleanup(&self) -> SourceResult<()> {
        let handle = {
            let _lifecycle = lock(&self.lifecycle);
            lock(&self.watch).take()
        };

        if let Some(handle) = handle {
            handle.shutdown().await;
        }

        let _lifecycle = lock(&self.lifecycle);
        self.shared.clear();
        debug!("File source cleaned up");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_is_yaml_file() {
        assert!(is_yaml_file(Path::new("a/config.yaml")));
        assert!(is_yaml_file(Path::new("a/config.yml")));
        assert!(!is_yaml_file(Path::new("a/config.toml")));
        assert!(!is_yaml_file(Path::new("a/yaml")));
    }

    #[test]
    fn test_resolve_missing_path() {
        let temp = TempDir::new().unwrap();
        let err = resolve_path(&temp.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(err, SourceError::FileNotFound(_)));
    }

    #[test]
    fn test_relative_and_absolute_paths_dedupe() {
        let temp = TempDir::new().unwrap();
        let sub = temp.path().join("conf");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("app.yaml"), "a: 1\n").unwrap();

        let source = YamlFileSource::new();
        source.add_file_source(&sub.join("app.yaml"), 1).unwrap();
        source
            .add_file_source(&sub.join(".").join("app.yaml"), 1)
            .unwrap();

        assert_eq!(source.registered_files().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_watcher_error_stops_watching() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("first.yaml");
        fs::write(&first, "a: 1\n").unwrap();

        let source = YamlFileSource::new();
        source.add_file_source(&first, 0).unwrap();
        let listener: Arc<dyn ChangeListener> = Arc::new(|_: &ChangeEvent| {});
        source.dynamic_config_handler(listener).await.unwrap();
        assert!(source.is_watching());

        if let Some(watch) = lock(&source.watch).as_ref() {
            watch.inject_error(notify::Error::generic("watch failed"));
        }
        let stopped = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while source.is_watching() {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(stopped.is_ok(), "watch loop kept running after error");

        // Adding sources still works with the loop gone.
        let other = TempDir::new().unwrap();
        let second = other.path().join("second.yaml");
        fs::write(&second, "b: 2\n").unwrap();
        source.add_file_source(&second, 0).unwrap();
        assert_eq!(source.get_configuration_by_key("b").unwrap(), Value::from(2));

        // A new handler restarts watching.
        let listener: Arc<dyn ChangeListener> = Arc::new(|_: &ChangeEvent| {});
        source.dynamic_config_handler(listener).await.unwrap();
        assert!(source.is_watching());

        source.cleanup().await.unwrap();
    }

    #[test]
    fn test_forward_without_listener_is_silent() {
        let source = YamlFileSource::new();
        source.forward(&[ChangeEvent::create(SOURCE_NAME, "k", Value::from(1))]);
        assert!(!source.is_watching());
    }
}
