//! Kubernetes client construction.

use std::path::Path;

use kube::Client;
use kube::config::{Config, KubeConfigOptions, Kubeconfig};
use tcpscope_common::error::{Result, TcpscopeError};

fn client_error(message: String) -> TcpscopeError {
    TcpscopeError::Kube {
        namespace: String::new(),
        message,
    }
}

/// Creates a client from `kubeconfig`, or from the in-cluster service
/// account and default kubeconfig discovery when no path is given.
///
/// # Errors
///
/// Returns an error if the kubeconfig cannot be read or no usable
/// configuration is found.
pub async fn connect(kubeconfig: Option<&Path>) -> Result<Client> {
    let Some(path) = kubeconfig else {
        tracing::debug!("using default kubernetes configuration");
        return Client::try_default()
            .await
            .map_err(|e| client_error(format!("no usable kubernetes configuration: {e}")));
    };

    if !path.exists() {
        return Err(TcpscopeError::NotFound {
            kind: "kubeconfig",
            id: path.display().to_string(),
        });
    }
    let raw = Kubeconfig::read_from(path)
        .map_err(|e| client_error(format!("reading {}: {e}", path.display())))?;
    let config = Config::from_custom_kubeconfig(raw, &KubeConfigOptions::default())
        .await
        .map_err(|e| client_error(format!("loading {}: {e}", path.display())))?;
    tracing::debug!(path = %path.display(), cluster = %config.cluster_url, "kubeconfig loaded");
    Client::try_from(config).map_err(|e| client_error(e.to_string()))
}
