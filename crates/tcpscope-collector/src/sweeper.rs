//! Periodic eviction of idle series.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::state::SharedState;

/// Sweeps the freshness table on a fixed cadence.
#[derive(Debug)]
pub struct Sweeper {
    state: Arc<SharedState>,
    ttl: Duration,
    interval: Duration,
}

impl Sweeper {
    /// Creates a sweeper evicting series idle longer than `ttl`, checking
    /// every `interval`.
    #[must_use]
    pub const fn new(state: Arc<SharedState>, ttl: Duration, interval: Duration) -> Self {
        Self {
            state,
            ttl,
            interval,
        }
    }

    /// Performs one sweep at the current time.
    pub fn sweep_once(&self) -> usize {
        let evicted = self.state.sweep(Instant::now(), self.ttl);
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.state.tracked(), "evicted idle series");
        }
        evicted
    }

    /// Sweeps every interval until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(ttl = ?self.ttl, interval = ?self.interval, "sweeper started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
            let _ = self.sweep_once();
        }
        tracing::info!("sweeper stopped");
    }
}
