//! YAML File Source
//!
//! Loads YAML configuration files and directories, merges them by priority
//! and optionally follows changes on disk.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use yaml_file_source::cli::{Cli, Command};
use yaml_file_source::config::{AppConfig, SourceSpec};
use yaml_file_source::logging::{LogTarget, init_logging};
use yaml_file_source::source::{ChangeListener, ConfigSource, FileSource, YamlFileSource};
use yaml_file_source::types::ChangeEvent;

/// Forwards events from the watch loop to the printing task.
struct ChannelListener(mpsc::UnboundedSender<ChangeEvent>);

impl ChangeListener for ChannelListener {
    fn on_event(&self, event: &ChangeEvent) {
        let _ = self.0.send(event.clone());
    }
}

/// Add every source, manifest entries first.
fn load_sources(source: &YamlFileSource, specs: &[SourceSpec]) -> Result<()> {
    for spec in specs {
        source
            .add_file_source(&spec.path, spec.priority)
            .with_context(|| format!("failed to add source {}", spec.path.display()))?;
    }
    Ok(())
}

fn print_snapshot(source: &YamlFileSource) -> Result<()> {
    let snapshot = source.get_configurations()?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn run_watch(source: &YamlFileSource) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    source
        .dynamic_config_handler(Arc::new(ChannelListener(tx)))
        .await?;
    info!("Watching for changes, press Ctrl-C to stop");

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    let line = json!({
                        "timestamp": Utc::now().to_rfc3339(),
                        "event": event,
                    });
                    println!("{}", line);
                }
                None => break,
            },
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                break;
            }
        }
    }

    source.cleanup().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_target: LogTarget = cli.log.parse()?;
    init_logging(&log_target, cli.verbose)?;

    let config = AppConfig::load_or_default(cli.config.as_deref())?;

    let mut specs = config.sources.clone();
    specs.extend(cli.command.sources().iter().cloned());
    if specs.is_empty() {
        warn!("No sources given; the configuration is empty");
    }

    let source = YamlFileSource::new();
    load_sources(&source, &specs)?;

    match &cli.command {
        Command::Dump { .. } => print_snapshot(&source)?,
        Command::Get { key, .. } => {
            let value = source.get_configuration_by_key(key)?;
            println!("{}", serde_json::to_string(&value)?);
        }
        Command::Watch { .. } => {
            print_snapshot(&source)?;
            if config.watch {
                run_watch(&source).await?;
            } else {
                info!("Watching disabled by configuration");
            }
        }
    }

    Ok(())
}
