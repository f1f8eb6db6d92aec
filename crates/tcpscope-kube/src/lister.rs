//! Pod listing.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::{Api, Client};
use tcpscope_common::error::{Result, TcpscopeError};

/// A pod that has been assigned an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodAddress {
    /// Pod name.
    pub name: String,
    /// Address from the pod status.
    pub ip: IpAddr,
}

/// Lists addressed pods in a namespace.
#[async_trait]
pub trait PodLister: Send + Sync {
    /// Returns every pod in `namespace` that has an IP address.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails or times out.
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodAddress>>;
}

/// Extracts name and address from a pod, skipping pods not yet assigned
/// an IP.
#[must_use]
pub fn pod_address(pod: &Pod) -> Option<PodAddress> {
    let name = pod.metadata.name.clone()?;
    let ip = pod.status.as_ref()?.pod_ip.as_ref()?.parse().ok()?;
    Some(PodAddress { name, ip })
}

/// [`PodLister`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubePodLister {
    client: Client,
    timeout: Duration,
}

impl KubePodLister {
    /// Creates a lister whose calls are bounded by `timeout`.
    #[must_use]
    pub const fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl PodLister for KubePodLister {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodAddress>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = tokio::time::timeout(self.timeout, api.list(&ListParams::default()))
            .await
            .map_err(|_| TcpscopeError::Timeout {
                operation: "pod list",
                after: self.timeout,
            })?
            .map_err(|e| TcpscopeError::Kube {
                namespace: namespace.to_owned(),
                message: e.to_string(),
            })?;
        tracing::trace!(namespace, count = pods.items.len(), "pods listed");
        Ok(pods.items.iter().filter_map(pod_address).collect())
    }
}
