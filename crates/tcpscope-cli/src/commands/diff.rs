//! `tcpscope diff`: offline comparison of two saved reports.

use std::fmt::Write as _;
use std::net::IpAddr;
use std::path::PathBuf;

use clap::Args;
use tcpscope_collector::differ::{self, IgnoreList, SnapshotDiff};
use tcpscope_collector::snapshot::SnapshotStore;

use crate::output;

/// Arguments for the `diff` command.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Earlier report.
    pub previous: PathBuf,

    /// Later report.
    pub current: PathBuf,

    /// Print one JSON object per persisted connection.
    #[arg(long)]
    pub json: bool,

    /// Comma-separated source IPs to leave out.
    #[arg(long, value_delimiter = ',')]
    pub ignore_src_ips: Vec<IpAddr>,
}

/// Executes the `diff` command.
///
/// # Errors
///
/// Returns an error if either report cannot be read.
pub fn execute(args: DiffArgs) -> anyhow::Result<()> {
    let previous = SnapshotStore::new(&args.previous)
        .load()
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let current = SnapshotStore::new(&args.current)
        .load()
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let diff = differ::diff_reports(&previous, &current, &IgnoreList::new(args.ignore_src_ips));
    print!("{}", render(&diff, args.json)?);
    tracing::info!(
        persisted = diff.persisted.len(),
        first_seen = diff.first_seen,
        malformed = diff.malformed,
        ignored = diff.ignored,
        "reports compared"
    );
    Ok(())
}

fn render(diff: &SnapshotDiff, json: bool) -> anyhow::Result<String> {
    if !json {
        if diff.persisted.is_empty() {
            return Ok("No persisted connections.\n".to_owned());
        }
        return Ok(output::connection_table(&diff.persisted));
    }
    let mut out = String::new();
    for obs in &diff.persisted {
        writeln!(out, "{}", serde_json::to_string(obs)?)?;
    }
    Ok(out)
}
