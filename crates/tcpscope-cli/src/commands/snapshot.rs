//! `tcpscope snapshot`: capture one report into the snapshot file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use tcpscope_collector::conntrack::{ConntrackCommand, ConntrackSource};
use tcpscope_collector::report;
use tcpscope_collector::snapshot::SnapshotStore;

use super::{base_config, duration_arg};

/// Arguments for the `snapshot` command.
#[derive(Args, Debug)]
pub struct SnapshotArgs {
    /// Destination file; defaults to the configured snapshot file.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Conntrack program to invoke.
    #[arg(long, env = "TCPSCOPE_CONNTRACK_PROGRAM")]
    pub conntrack_program: Option<PathBuf>,

    /// Deadline for the conntrack invocation.
    #[arg(long, env = "TCPSCOPE_COMMAND_TIMEOUT", value_parser = duration_arg)]
    pub command_timeout: Option<Duration>,
}

/// Executes the `snapshot` command.
///
/// Queries conntrack once and writes the raw report where the exporter
/// would read its baseline from.
///
/// # Errors
///
/// Returns an error if the query fails or the file cannot be written.
pub fn execute(args: SnapshotArgs, config_file: Option<&Path>) -> anyhow::Result<()> {
    let config = base_config(config_file)?;
    let command = ConntrackCommand::new(
        args.conntrack_program.unwrap_or(config.conntrack_program),
        args.command_timeout.unwrap_or(config.command_timeout),
    );
    let store = SnapshotStore::new(args.output.unwrap_or(config.snapshot_file));

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let report = runtime
        .block_on(command.query())
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    store.save(&report).map_err(|e| anyhow::anyhow!("{e}"))?;

    let connections = report::identities(&report).len();
    tracing::info!(path = %store.path().display(), connections, "snapshot written");
    println!("{connections} established connections written to {}", store.path().display());
    Ok(())
}
