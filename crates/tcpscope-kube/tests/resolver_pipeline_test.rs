//! Pod resolution feeding the sampling pipeline.
//!
//! A refreshed pod table must be visible to the very next sampling cycle,
//! and a failed refresh must leave earlier labels intact.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::float_cmp)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tcpscope_collector::conntrack::ConntrackSource;
use tcpscope_collector::differ::IgnoreList;
use tcpscope_collector::gauges::Series;
use tcpscope_collector::sampler::Sampler;
use tcpscope_collector::snapshot::SnapshotStore;
use tcpscope_collector::state::SharedState;
use tcpscope_common::error::{Result, TcpscopeError};
use tcpscope_common::types::LabelKey;
use tcpscope_kube::lister::{PodAddress, PodLister};
use tcpscope_kube::resolver::PodResolver;

const REPORT: &str = "tcp 6 431999 ESTABLISHED src=10.0.0.1 dst=10.0.0.2 sport=1111 dport=80 packets=10 bytes=4096 src=10.0.0.2 dst=10.0.0.1 sport=80 dport=1111 packets=8 bytes=2048 [ASSURED] mark=0 use=1\n";

struct Reports(Mutex<VecDeque<String>>);

#[async_trait]
impl ConntrackSource for Reports {
    async fn query(&self) -> Result<String> {
        Ok(self.0.lock().unwrap().pop_front().unwrap_or_else(|| REPORT.to_owned()))
    }
}

struct Pods(Arc<Mutex<Option<Vec<PodAddress>>>>);

#[async_trait]
impl PodLister for Pods {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodAddress>> {
        self.0.lock().unwrap().clone().ok_or_else(|| TcpscopeError::Kube {
            namespace: namespace.to_owned(),
            message: "connection refused".into(),
        })
    }
}

fn pod(name: &str, ip: &str) -> PodAddress {
    PodAddress {
        name: name.into(),
        ip: ip.parse().unwrap(),
    }
}

#[tokio::test]
async fn refreshed_pod_names_label_next_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let state = Arc::new(SharedState::new(false).unwrap());
    let sampler = Sampler::new(
        Box::new(Reports(Mutex::new(VecDeque::from([REPORT.to_owned()])))),
        SnapshotStore::new(dir.path().join("conntrack.txt")),
        Arc::clone(&state),
        IgnoreList::default(),
        Duration::from_secs(10),
    );
    let listing = Arc::new(Mutex::new(Some(vec![
        pod("web-1", "10.0.0.1"),
        pod("db-1", "10.0.0.2"),
    ])));
    let resolver = PodResolver::new(
        Box::new(Pods(Arc::clone(&listing))),
        vec!["default".into()],
        Arc::clone(&state),
        Duration::from_secs(1800),
    );

    sampler.ensure_baseline().await.unwrap();
    let _ = resolver.refresh_once().await.unwrap();
    let report = sampler.run_cycle().await.unwrap();
    assert_eq!(report.published, 1);

    let labelled: LabelKey = "10.0.0.1:web-1:10.0.0.2:db-1:1111:80".parse().unwrap();
    assert_eq!(state.gauges().value(Series::SendBytes, &labelled), Some(4096.0));
    assert_eq!(state.gauges().value(Series::RespBytes, &labelled), Some(2048.0));

    *listing.lock().unwrap() = None;
    assert!(resolver.refresh_once().await.is_err());
    let _ = sampler.run_cycle().await.unwrap();
    assert_eq!(state.tracked(), 1);
    assert!(state.is_tracked(&labelled));
    assert!(state.is_consistent());
}

#[tokio::test]
async fn unresolved_addresses_publish_empty_pod_labels() {
    let dir = tempfile::tempdir().unwrap();
    let state = Arc::new(SharedState::new(false).unwrap());
    let sampler = Sampler::new(
        Box::new(Reports(Mutex::new(VecDeque::from([REPORT.to_owned()])))),
        SnapshotStore::new(dir.path().join("conntrack.txt")),
        Arc::clone(&state),
        IgnoreList::default(),
        Duration::from_secs(10),
    );
    let resolver = PodResolver::new(
        Box::new(Pods(Arc::new(Mutex::new(Some(vec![pod("web-1", "10.0.0.1")]))))),
        vec!["default".into()],
        Arc::clone(&state),
        Duration::from_secs(1800),
    );

    sampler.ensure_baseline().await.unwrap();
    let _ = resolver.refresh_once().await.unwrap();
    let _ = sampler.run_cycle().await.unwrap();

    let key: LabelKey = "10.0.0.1:web-1:10.0.0.2::1111:80".parse().unwrap();
    assert!(state.is_tracked(&key));
}
