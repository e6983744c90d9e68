//! YAML File Source Library
//!
//! Dynamic configuration loaded from YAML files and directories, merged by
//! per-file priority and hot-reloaded from the filesystem.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod source;
pub mod types;
