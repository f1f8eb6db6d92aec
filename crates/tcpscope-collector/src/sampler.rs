//! The periodic sampling cycle.
//!
//! One cycle: load the previous report, query the current one, persist it
//! as the next baseline, diff the two, and publish the persisted
//! connections. I/O happens before the shared state is locked. A failed
//! cycle is logged and the next one runs on schedule.

use std::sync::Arc;
use std::time::Duration;

use tcpscope_common::error::Result;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::conntrack::ConntrackSource;
use crate::differ::{self, IgnoreList};
use crate::labels;
use crate::snapshot::SnapshotStore;
use crate::state::SharedState;

/// Counts describing one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Connections present in both reports and not ignored.
    pub persisted: usize,
    /// Connections seen for the first time.
    pub first_seen: usize,
    /// Persisted lines that could not be parsed.
    pub malformed: usize,
    /// Persisted connections dropped by the ignore list.
    pub ignored: usize,
    /// Publications that set at least one gauge.
    pub published: usize,
    /// Below-threshold publications that refreshed a live series.
    pub refreshed: usize,
}

/// Drives sampling cycles against a [`ConntrackSource`].
pub struct Sampler {
    source: Box<dyn ConntrackSource>,
    store: SnapshotStore,
    state: Arc<SharedState>,
    ignore: IgnoreList,
    interval: Duration,
}

impl Sampler {
    /// Creates a sampler that sleeps `interval` between cycles.
    #[must_use]
    pub fn new(
        source: Box<dyn ConntrackSource>,
        store: SnapshotStore,
        state: Arc<SharedState>,
        ignore: IgnoreList,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            store,
            state,
            ignore,
            interval,
        }
    }

    /// Makes sure a baseline snapshot exists and is readable.
    ///
    /// When no snapshot exists, one report is captured and saved. A failed
    /// query yields an empty baseline; a failed write is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the baseline cannot be written or read back.
    pub async fn ensure_baseline(&self) -> Result<()> {
        if !self.store.exists() {
            tracing::info!(
                path = %self.store.path().display(),
                "no snapshot baseline, capturing initial report"
            );
            let report = match self.source.query().await {
                Ok(report) => report,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "initial conntrack query failed, starting from an empty baseline"
                    );
                    String::new()
                }
            };
            self.store.save(&report)?;
            tracing::info!(path = %self.store.path().display(), "initial snapshot saved");
        }
        let _ = self.store.load()?;
        Ok(())
    }

    /// Runs a single sampling cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the previous report cannot be read, the query
    /// fails, or the new baseline cannot be saved. Nothing is published in
    /// that case.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let previous = match self.store.load() {
            Ok(report) => report,
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    path = %self.store.path().display(),
                    "snapshot missing, using empty baseline"
                );
                String::new()
            }
            Err(e) => return Err(e),
        };

        let current = self.source.query().await?;
        self.store.save(&current)?;

        let diff = differ::diff_reports(&previous, &current, &self.ignore);
        if diff.malformed > 0 {
            tracing::warn!(count = diff.malformed, "skipped conntrack lines without counters");
        }

        let pods = self.state.pods().load();
        let collect_packets = self.state.gauges().collects_packets();
        let publications: Vec<_> = diff
            .persisted
            .iter()
            .map(|obs| labels::build_publication(obs, &pods, collect_packets))
            .collect();
        let stats = self.state.publish(publications, Instant::now());

        Ok(CycleReport {
            persisted: diff.persisted.len(),
            first_seen: diff.first_seen,
            malformed: diff.malformed,
            ignored: diff.ignored,
            published: stats.published,
            refreshed: stats.refreshed,
        })
    }

    /// Runs cycles until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            interval = ?self.interval,
            ignored_sources = self.ignore.len(),
            "sampler started"
        );
        loop {
            match self.run_cycle().await {
                Ok(report) => tracing::debug!(
                    persisted = report.persisted,
                    first_seen = report.first_seen,
                    malformed = report.malformed,
                    ignored = report.ignored,
                    published = report.published,
                    refreshed = report.refreshed,
                    tracked = self.state.tracked(),
                    "sampling cycle complete"
                ),
                Err(e) => tracing::warn!(error = %e, "sampling cycle aborted"),
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }
        tracing::info!("sampler stopped");
    }
}
