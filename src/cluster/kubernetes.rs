use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::Client;
use log::{debug, info, warn};
use tokio::sync::Mutex;

use super::InstanceSource;
use crate::error::{PeerdError, Result};
use crate::types::{Instance, InstancePhase, LabelSelector};

/// Lists pods through the Kubernetes API.
///
/// The client is built on first use and cached for the process lifetime. A
/// failed construction is not cached, so every call retries until one
/// succeeds.
pub struct KubeInstanceSource {
    client: Mutex<Option<Client>>,
}

impl KubeInstanceSource {
    pub fn new() -> Self {
        Self {
            client: Mutex::new(None),
        }
    }

    /// Return the cached client, building it from the in-cluster or
    /// kubeconfig environment if needed.
    pub async fn connect(&self) -> Result<Client> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::try_default().await.map_err(|e| {
            PeerdError::connectivity(format!("Can't connect to Kubernetes API: {}", e))
        })?;
        info!("Connected to Kubernetes API");
        *guard = Some(client.clone());
        Ok(client)
    }
}

impl Default for KubeInstanceSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstanceSource for KubeInstanceSource {
    async fn list_running(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<Instance>> {
        let client = self.connect().await?;
        let api: Api<Pod> = Api::namespaced(client, namespace);

        let mut params = ListParams::default();
        if !selector.is_empty() {
            params = params.labels(&selector.to_string());
        }

        let pods = api.list(&params).await?;
        debug!(
            "Listed {} pods in {} matching {:?}",
            pods.items.len(),
            namespace,
            selector.to_string()
        );
        Ok(running_instances(&pods.items, selector))
    }
}

/// Convert listed pods into running instances that match `selector`.
///
/// The selector is re-checked locally so the result never depends on the
/// server honouring it.
pub fn running_instances(pods: &[Pod], selector: &LabelSelector) -> Vec<Instance> {
    let mut result = Vec::new();
    for pod in pods {
        let Some(name) = pod.metadata.name.as_deref() else {
            warn!("Skipping pod without a name");
            continue;
        };

        let empty = Default::default();
        let labels = pod.metadata.labels.as_ref().unwrap_or(&empty);
        if !selector.matches(labels) {
            continue;
        }

        let status = pod.status.as_ref();
        let phase = InstancePhase::from_api(status.and_then(|s| s.phase.as_deref()));
        let address = status.and_then(|s| s.pod_ip.clone()).unwrap_or_default();
        let instance = Instance::new(name, address, phase);
        if !instance.is_running() {
            debug!("Ignoring pod {} in phase {:?}", name, phase);
            continue;
        }
        result.push(instance);
    }
    result
}
