//! Last-observed timestamps per published series.

use std::collections::HashMap;
use std::time::Duration;

use tcpscope_common::types::LabelKey;
use tokio::time::Instant;

/// Tracks when each live [`LabelKey`] was last observed.
///
/// Timestamps never move backwards for a live key.
#[derive(Debug, Default)]
pub struct FreshnessTable {
    last_seen: HashMap<LabelKey, Instant>,
}

impl FreshnessTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` as observed at `now`, inserting it if absent.
    pub fn touch(&mut self, key: &LabelKey, now: Instant) {
        if let Some(seen) = self.last_seen.get_mut(key) {
            *seen = (*seen).max(now);
        } else {
            let _ = self.last_seen.insert(key.clone(), now);
        }
    }

    /// Marks an already-live `key` as observed. Returns `false` and leaves
    /// the table unchanged if the key is not live.
    pub fn refresh(&mut self, key: &LabelKey, now: Instant) -> bool {
        self.last_seen.get_mut(key).is_some_and(|seen| {
            *seen = (*seen).max(now);
            true
        })
    }

    /// Last observation of `key`, if live.
    #[must_use]
    pub fn last_seen(&self, key: &LabelKey) -> Option<Instant> {
        self.last_seen.get(key).copied()
    }

    /// Returns `true` if `key` is live.
    #[must_use]
    pub fn contains(&self, key: &LabelKey) -> bool {
        self.last_seen.contains_key(key)
    }

    /// Removes and returns every key idle for strictly longer than `ttl`.
    pub fn take_expired(&mut self, now: Instant, ttl: Duration) -> Vec<LabelKey> {
        let expired: Vec<LabelKey> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) > ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            let _ = self.last_seen.remove(key);
        }
        expired
    }

    /// Iterates over the live keys.
    pub fn keys(&self) -> impl Iterator<Item = &LabelKey> {
        self.last_seen.keys()
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    /// Returns `true` if nothing is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(port: u16) -> LabelKey {
        LabelKey {
            src_ip: "10.0.0.1".parse().unwrap(),
            src_pod: "web-1".into(),
            dst_ip: "10.0.0.2".parse().unwrap(),
            dst_pod: "db-1".into(),
            src_port: port,
            dst_port: 80,
        }
    }

    #[test]
    fn touch_inserts_and_refreshes() {
        let mut table = FreshnessTable::new();
        let t0 = Instant::now();
        table.touch(&key(1), t0);
        table.touch(&key(1), t0 + Duration::from_secs(5));
        assert_eq!(table.len(), 1);
        assert_eq!(table.last_seen(&key(1)), Some(t0 + Duration::from_secs(5)));
    }

    #[test]
    fn timestamps_never_move_backwards() {
        let mut table = FreshnessTable::new();
        let t0 = Instant::now();
        table.touch(&key(1), t0 + Duration::from_secs(10));
        table.touch(&key(1), t0);
        assert!(table.refresh(&key(1), t0 + Duration::from_secs(3)));
        assert_eq!(table.last_seen(&key(1)), Some(t0 + Duration::from_secs(10)));
    }

    #[test]
    fn refresh_does_not_create_entries() {
        let mut table = FreshnessTable::new();
        assert!(!table.refresh(&key(1), Instant::now()));
        assert!(table.is_empty());
    }

    #[test]
    fn take_expired_uses_strict_ttl() {
        let mut table = FreshnessTable::new();
        let t0 = Instant::now();
        let ttl = Duration::from_secs(15);
        table.touch(&key(1), t0);
        table.touch(&key(2), t0 + Duration::from_secs(10));

        assert!(table.take_expired(t0 + ttl, ttl).is_empty());

        let expired = table.take_expired(t0 + ttl + Duration::from_millis(1), ttl);
        assert_eq!(expired, vec![key(1)]);
        assert!(!table.contains(&key(1)));
        assert!(table.contains(&key(2)));
    }
}
