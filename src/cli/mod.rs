//! CLI command definitions for yaml-file-source
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

use crate::config::SourceSpec;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Load, merge and watch YAML configuration files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the sources manifest
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the merged configuration as JSON
    Dump {
        /// Files or directories as `path` or `path:priority`
        sources: Vec<SourceSpec>,
    },

    /// Print one configuration value as JSON
    Get {
        /// Dotted key, e.g. `db.host`
        key: String,

        /// Files or directories as `path` or `path:priority`
        sources: Vec<SourceSpec>,
    },

    /// Print the merged configuration, then every change as a JSON line
    Watch {
        /// Files or directories as `path` or `path:priority`
        sources: Vec<SourceSpec>,
    },
}

impl Command {
    /// Sources given on the command line.
    pub fn sources(&self) -> &[SourceSpec] {
        match self {
            Command::Dump { sources } | Command::Watch { sources } => sources,
            Command::Get { sources, .. } => sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get() {
        let cli = Cli::parse_from(["yaml-file-source", "get", "db.host", "a.yaml:1", "conf.d"]);
        match &cli.command {
            Command::Get { key, sources } => {
                assert_eq!(key, "db.host");
                assert_eq!(sources.len(), 2);
                assert_eq!(sources[0], SourceSpec::new("a.yaml", 1));
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.log, "2");
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["yaml-file-source", "watch", "-v", "--log", "off"]);
        assert!(cli.verbose);
        assert_eq!(cli.log, "off");
        assert!(cli.command.sources().is_empty());
    }
}
