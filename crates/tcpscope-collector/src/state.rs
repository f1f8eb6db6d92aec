//! Shared state of the running exporter.
//!
//! The freshness table and the gauge collection change in lockstep under
//! one mutex, so a sweep's read-then-delete cannot interleave with a
//! sampling cycle's writes. The pod table is swapped atomically and needs
//! no lock. Scrapes read the gauge registry without taking the mutex.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tcpscope_common::error::Result;
use tcpscope_common::types::LabelKey;
use tokio::time::Instant;

use crate::freshness::FreshnessTable;
use crate::gauges::GaugeCollection;
use crate::labels::Publication;
use crate::pods::SharedPodIndex;

/// Outcome of publishing one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStats {
    /// Publications that set at least one gauge.
    pub published: usize,
    /// Below-threshold publications that kept an existing series fresh.
    pub refreshed: usize,
    /// Below-threshold publications with no existing series.
    pub below_threshold: usize,
}

/// State shared by the sampler, sweeper, resolver, and scrape handler.
#[derive(Debug)]
pub struct SharedState {
    pods: SharedPodIndex,
    freshness: Mutex<FreshnessTable>,
    gauges: GaugeCollection,
}

impl SharedState {
    /// Creates empty state with the gauges registered.
    ///
    /// # Errors
    ///
    /// Returns an error if gauge registration fails.
    pub fn new(collect_packets: bool) -> Result<Self> {
        Ok(Self {
            pods: SharedPodIndex::default(),
            freshness: Mutex::new(FreshnessTable::new()),
            gauges: GaugeCollection::new(collect_packets)?,
        })
    }

    /// Pod table handle.
    #[must_use]
    pub const fn pods(&self) -> &SharedPodIndex {
        &self.pods
    }

    /// Gauge collection, for read-only use by scrapes.
    #[must_use]
    pub const fn gauges(&self) -> &GaugeCollection {
        &self.gauges
    }

    fn lock_freshness(&self) -> MutexGuard<'_, FreshnessTable> {
        self.freshness.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("freshness lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Applies a batch of publications observed at `now`.
    ///
    /// A publication that sets a gauge creates or refreshes its freshness
    /// entry. One that sets nothing only refreshes a key that is already
    /// live, so a freshness entry never exists without a series.
    pub fn publish(
        &self,
        publications: impl IntoIterator<Item = Publication>,
        now: Instant,
    ) -> PublishStats {
        let mut stats = PublishStats::default();
        let mut table = self.lock_freshness();
        for publication in publications {
            if publication.sets_any_gauge() {
                let _ = self.gauges.apply(&publication);
                table.touch(&publication.key, now);
                stats.published += 1;
            } else if table.refresh(&publication.key, now) {
                stats.refreshed += 1;
            } else {
                stats.below_threshold += 1;
            }
        }
        stats
    }

    /// Evicts every series idle for longer than `ttl`. Returns the number
    /// of label sets removed.
    pub fn sweep(&self, now: Instant, ttl: Duration) -> usize {
        let mut table = self.lock_freshness();
        let expired = table.take_expired(now, ttl);
        for key in &expired {
            let removed = self.gauges.remove(key);
            tracing::trace!(key = %key, removed, "evicted idle series");
        }
        expired.len()
    }

    /// Number of live label sets.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.lock_freshness().len()
    }

    /// Returns `true` if `key` is live.
    #[must_use]
    pub fn is_tracked(&self, key: &LabelKey) -> bool {
        self.lock_freshness().contains(key)
    }

    /// Last observation of `key`, if live.
    #[must_use]
    pub fn last_seen(&self, key: &LabelKey) -> Option<Instant> {
        self.lock_freshness().last_seen(key)
    }

    /// Checks that the tracked keys and the gauge series agree.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let table = self.lock_freshness();
        let live = self.gauges.live_keys();
        live.len() == table.len() && table.keys().all(|key| live.contains(key))
    }
}
