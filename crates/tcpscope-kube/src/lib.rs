//! # tcpscope-kube
//!
//! Pod identity resolution for tcpscope.
//!
//! - [`client`]: builds a Kubernetes client from a kubeconfig path or the
//!   in-cluster environment.
//! - [`lister`]: the [`lister::PodLister`] seam and its API-backed
//!   implementation.
//! - [`resolver`]: the periodic task that rebuilds the pod table and swaps
//!   it into the shared state.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod client;
pub mod lister;
pub mod resolver;
