//! Pod address lookup table.
//!
//! A [`PodIndex`] is built in full by the resolver and then published
//! through [`SharedPodIndex`], which swaps the whole table atomically.
//! Readers hold an `Arc` to whichever complete table was current when
//! they loaded it.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;

/// Immutable mapping from pod IP address to pod name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodIndex {
    by_ip: HashMap<IpAddr, String>,
}

impl PodIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry while the index is being built, returning any name
    /// previously recorded for the address.
    pub fn insert(&mut self, ip: IpAddr, pod: impl Into<String>) -> Option<String> {
        self.by_ip.insert(ip, pod.into())
    }

    /// Returns the pod name for `ip`, or `""` if unknown.
    #[must_use]
    pub fn resolve(&self, ip: &IpAddr) -> &str {
        self.by_ip.get(ip).map_or("", String::as_str)
    }

    /// Number of indexed addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_ip.len()
    }

    /// Returns `true` if no address is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_ip.is_empty()
    }
}

impl FromIterator<(IpAddr, String)> for PodIndex {
    fn from_iter<T: IntoIterator<Item = (IpAddr, String)>>(iter: T) -> Self {
        Self {
            by_ip: iter.into_iter().collect(),
        }
    }
}

/// Atomically replaceable handle to the current [`PodIndex`].
#[derive(Debug)]
pub struct SharedPodIndex {
    current: ArcSwap<PodIndex>,
}

impl SharedPodIndex {
    /// Wraps an initial index.
    #[must_use]
    pub fn new(initial: PodIndex) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Returns the table published by the last completed refresh.
    #[must_use]
    pub fn load(&self) -> Arc<PodIndex> {
        self.current.load_full()
    }

    /// Publishes a new table, returning the one it replaced.
    pub fn replace(&self, index: PodIndex) -> Arc<PodIndex> {
        self.current.swap(Arc::new(index))
    }
}

impl Default for SharedPodIndex {
    fn default() -> Self {
        Self::new(PodIndex::default())
    }
}
