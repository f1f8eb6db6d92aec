//! CLI command definitions and dispatch.

pub mod diff;
pub mod serve;
pub mod snapshot;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tcpscope_common::config::{self, ExporterConfig};

/// tcpscope: export persistent TCP connections as Prometheus gauges.
#[derive(Parser, Debug)]
#[command(name = "tcpscope", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// YAML configuration file; flags override its values.
    #[arg(long, global = true, env = "TCPSCOPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "TCPSCOPE_LOG_JSON")]
    pub log_json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the exporter: sample, publish, expire and serve metrics.
    Serve(serve::ServeArgs),
    /// Capture one conntrack report into the snapshot file.
    Snapshot(snapshot::SnapshotArgs),
    /// Compare two saved reports and print the persisted connections.
    Diff(diff::DiffArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => serve::execute(args, cli.config.as_deref()),
        Command::Snapshot(args) => snapshot::execute(args, cli.config.as_deref()),
        Command::Diff(args) => diff::execute(args),
    }
}

/// Loads the configuration file if one was given, or the defaults.
fn base_config(path: Option<&Path>) -> anyhow::Result<ExporterConfig> {
    path.map_or_else(
        || Ok(ExporterConfig::default()),
        |p| ExporterConfig::load(p).map_err(|e| anyhow::anyhow!("{e}")),
    )
}

/// Clap value parser for compact durations such as `10s` or `1h30m`.
fn duration_arg(s: &str) -> Result<std::time::Duration, String> {
    config::parse_duration(s).map_err(|e| e.to_string())
}
