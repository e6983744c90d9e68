//! Registry of file sources and their priorities.

use std::path::{Path, PathBuf};

/// A registered file. Lower `priority` wins key conflicts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub priority: u32,
}

/// Ordered collection of registered files, keyed by path.
#[derive(Debug, Default, Clone)]
pub struct FileRegistry {
    files: Vec<FileEntry>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` at `priority`.
    ///
    /// An existing entry keeps its position and only has its priority replaced.
    pub fn register(&mut self, path: &Path, priority: u32) {
        match self.files.iter_mut().find(|f| f.path == path) {
            Some(entry) => entry.priority = priority,
            None => self.files.push(FileEntry {
                path: path.to_path_buf(),
                priority,
            }),
        }
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.files.iter().any(|f| f.path == path)
    }

    /// Priority of `path`, or `None` if it is not registered.
    pub fn priority_of(&self, path: &Path) -> Option<u32> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.priority)
    }

    /// Registered paths in registration order.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|f| f.path.as_path())
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }
}
