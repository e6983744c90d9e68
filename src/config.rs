//! Configuration for the command line front end.
//!
//! A manifest lists the file sources to load and whether to watch them:
//!
//! ```yaml
//! sources:
//!   - path: ./conf/base.yaml
//!     priority: 2
//!   - path: ./conf.d
//! watch: true
//! ```
//!
//! ## Environment Variables
//! - `YAML_FILE_SOURCE_CONFIG` - Manifest path (when `--config` is not given)
//! - `YAML_FILE_SOURCE_WATCH` - `0`/`false` disables watching

use crate::types::DEFAULT_FILE_PRIORITY;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Environment variable naming the manifest file.
pub const CONFIG_PATH_ENV: &str = "YAML_FILE_SOURCE_CONFIG";

/// Environment variable overriding `watch`.
pub const WATCH_ENV: &str = "YAML_FILE_SOURCE_WATCH";

/// Manifest file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "file-source.yaml";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// File sources to load, in order.
    #[serde(default)]
    pub sources: Vec<SourceSpec>,

    /// Whether to watch sources for changes.
    #[serde(default = "default_watch")]
    pub watch: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            watch: default_watch(),
        }
    }
}

fn default_watch() -> bool {
    true
}

/// One file or directory to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub path: PathBuf,

    /// Lower numbers win key conflicts.
    #[serde(default = "default_priority")]
    pub priority: u32,
}

fn default_priority() -> u32 {
    DEFAULT_FILE_PRIORITY
}

impl SourceSpec {
    pub fn new(path: impl Into<PathBuf>, priority: u32) -> Self {
        Self {
            path: path.into(),
            priority,
        }
    }
}

impl FromStr for SourceSpec {
    type Err = anyhow::Error;

    /// Parse `path` or `path:priority`.
    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(anyhow!("source path must not be empty"));
        }

        if let Some((path, priority)) = s.rsplit_once(':')
            && !path.is_empty()
            && let Ok(priority) = priority.parse::<u32>()
        {
            return Ok(Self::new(path, priority));
        }

        Ok(Self::new(s, DEFAULT_FILE_PRIORITY))
    }
}

impl AppConfig {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: AppConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Locate the manifest: explicit path, environment, working directory,
    /// then the user config directory.
    pub fn discover(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Some(PathBuf::from(path));
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }

        dirs::home_dir()
            .map(|home| home.join(".yaml-file-source").join("config.yaml"))
            .filter(|path| path.exists())
    }

    /// Load the discovered manifest, or defaults when there is none.
    ///
    /// An explicitly named manifest must exist.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match Self::discover(explicit) {
            Some(path) => {
                debug!("Loading manifest from {}", path.display());
                Self::load(&path)?
            }
            None => Self::default(),
        };

        if let Ok(watch) = std::env::var(WATCH_ENV) {
            config.watch = !matches!(watch.to_ascii_lowercase().as_str(), "0" | "false" | "off");
        }

        Ok(config)
    }
}
