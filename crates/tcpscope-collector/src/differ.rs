//! Snapshot-to-snapshot connection matching.
//!
//! A connection is eligible for publication only when its identity appears
//! in both the previous and the current report, i.e. it survived at least
//! one full sampling interval. Each current line is checked against the
//! previous identities on its own; no match state carries between lines.

use std::collections::HashSet;
use std::net::IpAddr;

use tcpscope_common::types::ConnectionObservation;

use crate::report;

/// Source addresses whose connections are dropped before publication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreList(HashSet<IpAddr>);

impl IgnoreList {
    /// Builds an ignore list from the given addresses.
    pub fn new(ips: impl IntoIterator<Item = IpAddr>) -> Self {
        Self(ips.into_iter().collect())
    }

    /// Returns `true` if connections from `ip` must not be published.
    #[must_use]
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.0.contains(ip)
    }

    /// Number of ignored addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if nothing is ignored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Result of comparing two successive reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// Connections present in both reports, in current-report order.
    pub persisted: Vec<ConnectionObservation>,
    /// Lines whose identity was absent from the previous report.
    pub first_seen: usize,
    /// Persisted lines whose counters could not be parsed.
    pub malformed: usize,
    /// Persisted lines dropped by the ignore list.
    pub ignored: usize,
}

/// Compares the previous and current report texts.
#[must_use]
pub fn diff_reports(previous: &str, current: &str, ignore: &IgnoreList) -> SnapshotDiff {
    let baseline = report::identities(previous);
    let mut diff = SnapshotDiff::default();

    for line in current.lines() {
        let Some(identity) = report::parse_identity(line) else {
            continue;
        };
        if !baseline.contains(&identity) {
            diff.first_seen += 1;
            continue;
        }

        match report::parse_observation(line) {
            Ok(obs) if ignore.contains(&obs.src_ip) => diff.ignored += 1,
            Ok(obs) => diff.persisted.push(obs),
            Err(e) => {
                diff.malformed += 1;
                tracing::debug!(error = %e, "skipping conntrack line");
            }
        }
    }

    diff
}
