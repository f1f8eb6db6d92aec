//! Connection-tracking sampling pipeline for tcpscope.
//!
//! Each sampling cycle loads the previous report from the
//! [`snapshot::SnapshotStore`], queries a fresh one from a
//! [`conntrack::ConntrackSource`], and keeps only connections present in
//! both ([`differ`]). Survivors are joined with the current
//! [`pods::PodIndex`] into label sets ([`labels`]) and published into the
//! gauge collection held by [`state::SharedState`]. A separate
//! [`sweeper`] evicts series that have been idle longer than the TTL, and
//! [`exposition`] serves the gauges over HTTP.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod conntrack;
pub mod differ;
pub mod exposition;
pub mod freshness;
pub mod gauges;
pub mod labels;
pub mod pods;
pub mod report;
pub mod sampler;
pub mod snapshot;
pub mod state;
pub mod sweeper;
