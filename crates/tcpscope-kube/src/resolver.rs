//! Periodic pod table refresh.
//!
//! Each cycle lists every configured namespace and builds a complete
//! [`PodIndex`]. The new table is published with a single atomic swap, and
//! only when every namespace listed successfully; a failing cycle leaves the
//! previous table in place and the task carries on at its next tick.

use std::sync::Arc;
use std::time::Duration;

use tcpscope_collector::pods::PodIndex;
use tcpscope_collector::state::SharedState;
use tcpscope_common::error::Result;
use tokio_util::sync::CancellationToken;

use crate::lister::PodLister;

/// Keeps the shared pod table in step with the cluster.
pub struct PodResolver {
    lister: Box<dyn PodLister>,
    namespaces: Vec<String>,
    state: Arc<SharedState>,
    interval: Duration,
}

impl PodResolver {
    /// Creates a resolver for `namespaces`, refreshing every `interval`.
    #[must_use]
    pub fn new(
        lister: Box<dyn PodLister>,
        namespaces: Vec<String>,
        state: Arc<SharedState>,
        interval: Duration,
    ) -> Self {
        Self {
            lister,
            namespaces,
            state,
            interval,
        }
    }

    /// Lists every namespace and assembles a fresh table.
    ///
    /// # Errors
    ///
    /// Returns the first listing error; no partial table is produced.
    pub async fn build_index(&self) -> Result<PodIndex> {
        let mut index = PodIndex::new();
        for namespace in &self.namespaces {
            for pod in self.lister.list_pods(namespace).await? {
                if let Some(previous) = index.insert(pod.ip, pod.name.clone()) {
                    if previous != pod.name {
                        tracing::debug!(
                            ip = %pod.ip,
                            previous = %previous,
                            current = %pod.name,
                            "address shared by multiple pods"
                        );
                    }
                }
            }
        }
        Ok(index)
    }

    /// Runs one refresh, swapping the new table in on success.
    ///
    /// # Errors
    ///
    /// Returns the listing error; the current table is left untouched.
    pub async fn refresh_once(&self) -> Result<usize> {
        let index = self.build_index().await?;
        let count = index.len();
        let previous = self.state.pods().replace(index);
        tracing::debug!(pods = count, previous = previous.len(), "pod table refreshed");
        Ok(count)
    }

    /// Refreshes immediately, then every interval until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            namespaces = ?self.namespaces,
            interval = ?self.interval,
            "pod resolver started"
        );
        loop {
            if let Err(e) = self.refresh_once().await {
                tracing::warn!(error = %e, "pod refresh failed, keeping previous table");
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }
        tracing::info!("pod resolver stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::IpAddr;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tcpscope_common::error::TcpscopeError;

    use super::*;
    use crate::lister::PodAddress;

    /// Serves fixed pods per namespace; namespaces in `failing` error out.
    #[derive(Default)]
    struct FakeLister {
        pods: Mutex<HashMap<String, Vec<PodAddress>>>,
        failing: Mutex<Vec<String>>,
    }

    impl FakeLister {
        fn set(&self, namespace: &str, pods: &[(&str, &str)]) {
            let pods = pods
                .iter()
                .map(|(name, ip)| PodAddress {
                    name: (*name).into(),
                    ip: ip.parse().unwrap(),
                })
                .collect();
            let _ = self.pods.lock().unwrap().insert(namespace.into(), pods);
        }

        fn fail(&self, namespace: &str) {
            self.failing.lock().unwrap().push(namespace.into());
        }
    }

    #[async_trait]
    impl PodLister for Arc<FakeLister> {
        async fn list_pods(&self, namespace: &str) -> Result<Vec<PodAddress>> {
            if self.failing.lock().unwrap().iter().any(|n| n == namespace) {
                return Err(TcpscopeError::Kube {
                    namespace: namespace.into(),
                    message: "forbidden".into(),
                });
            }
            Ok(self.pods.lock().unwrap().get(namespace).cloned().unwrap_or_default())
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn resolver(lister: &Arc<FakeLister>, namespaces: &[&str]) -> (PodResolver, Arc<SharedState>) {
        let state = Arc::new(SharedState::new(false).unwrap());
        let resolver = PodResolver::new(
            Box::new(Arc::clone(lister)),
            namespaces.iter().map(|n| (*n).to_owned()).collect(),
            Arc::clone(&state),
            Duration::from_secs(1800),
        );
        (resolver, state)
    }

    #[tokio::test]
    async fn refresh_indexes_all_namespaces() {
        let lister = Arc::new(FakeLister::default());
        lister.set("default", &[("web-1", "10.0.0.1")]);
        lister.set("data", &[("db-1", "10.0.0.2")]);
        let (resolver, state) = resolver(&lister, &["default", "data"]);

        assert_eq!(resolver.refresh_once().await.unwrap(), 2);
        let pods = state.pods().load();
        assert_eq!(pods.resolve(&ip("10.0.0.1")), "web-1");
        assert_eq!(pods.resolve(&ip("10.0.0.2")), "db-1");
        assert_eq!(pods.resolve(&ip("10.0.0.3")), "");
    }

    #[tokio::test]
    async fn failed_namespace_keeps_previous_table() {
        let lister = Arc::new(FakeLister::default());
        lister.set("default", &[("web-1", "10.0.0.1")]);
        let (resolver, state) = resolver(&lister, &["default", "data"]);
        let _ = resolver.refresh_once().await.unwrap();

        lister.set("default", &[("web-2", "10.0.0.1")]);
        lister.fail("data");
        assert!(resolver.refresh_once().await.is_err());
        assert_eq!(state.pods().load().resolve(&ip("10.0.0.1")), "web-1");
    }

    #[tokio::test]
    async fn removed_pods_disappear_on_refresh() {
        let lister = Arc::new(FakeLister::default());
        lister.set("default", &[("web-1", "10.0.0.1"), ("web-2", "10.0.0.5")]);
        let (resolver, state) = resolver(&lister, &["default"]);
        let _ = resolver.refresh_once().await.unwrap();

        lister.set("default", &[("web-2", "10.0.0.5")]);
        let _ = resolver.refresh_once().await.unwrap();
        let pods = state.pods().load();
        assert_eq!(pods.resolve(&ip("10.0.0.1")), "");
        assert_eq!(pods.resolve(&ip("10.0.0.5")), "web-2");
    }

    #[tokio::test]
    async fn shared_address_resolves_to_last_listed_pod() {
        let lister = Arc::new(FakeLister::default());
        lister.set("default", &[("node-agent", "192.168.1.10"), ("kube-proxy", "192.168.1.10")]);
        let (resolver, _) = resolver(&lister, &["default"]);

        let index = resolver.build_index().await.unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.resolve(&ip("192.168.1.10")), "kube-proxy");
    }

    #[tokio::test(start_paused = true)]
    async fn run_survives_failures_and_recovers() {
        let lister = Arc::new(FakeLister::default());
        lister.set("default", &[("web-1", "10.0.0.1")]);
        lister.fail("default");
        let (resolver, state) = resolver(&lister, &["default"]);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(resolver.run(cancel.clone()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(state.pods().load().is_empty());

        lister.failing.lock().unwrap().clear();
        tokio::time::sleep(Duration::from_secs(1800)).await;
        assert_eq!(state.pods().load().resolve(&ip("10.0.0.1")), "web-1");

        cancel.cancel();
        task.await.unwrap();
    }
}
