//! Bindery kubehub: resolves ConfigMaps and Secrets through kube-rs.

#![forbid(unsafe_code)]

use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bindery_core::{FetchError, ResourceDocument, ResourceFetcher, ResourceKind};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{Api, Client};
use metrics::{counter, histogram};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

fn fetch_timeout() -> Duration {
    let secs = std::env::var("BINDERY_FETCH_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(10);
    Duration::from_secs(secs.max(1))
}

/// Build a client from the ambient kubeconfig or in-cluster config.
pub async fn get_kube_client() -> Result<Client> {
    Client::try_default().await.context("building kube client from default config")
}

/// `ResourceFetcher` over a live cluster. One GET per call; no caching or retry.
#[derive(Clone)]
pub struct KubeFetcher {
    client: Client,
    timeout: Duration,
}

impl KubeFetcher {
    pub fn new(client: Client) -> Self {
        Self { client, timeout: fetch_timeout() }
    }

    pub async fn try_default() -> Result<Self> {
        Ok(Self::new(get_kube_client().await?))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn get_typed<K>(&self, namespace: &str, name: &str) -> Result<Option<serde_json::Value>>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Serialize
            + std::fmt::Debug,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let got = tokio::time::timeout(self.timeout, api.get_opt(name))
            .await
            .map_err(|_| anyhow!("timed out after {:?}", self.timeout))??;
        match got {
            Some(obj) => Ok(Some(serde_json::to_value(&obj).context("serializing fetched object")?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ResourceFetcher for KubeFetcher {
    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<ResourceDocument, FetchError> {
        let t0 = Instant::now();
        counter!("binding_fetch_total", 1u64, "kind" => kind.plural());
        debug!(%kind, ns = %namespace, name = %name, "fetching referenced resource");
        let res = match kind {
            ResourceKind::ConfigMaps => self.get_typed::<ConfigMap>(namespace, name).await,
            ResourceKind::Secrets => self.get_typed::<Secret>(namespace, name).await,
        };
        histogram!("binding_fetch_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
        match res {
            Ok(Some(raw)) => Ok(ResourceDocument::from_json(raw).with_namespace(namespace)),
            Ok(None) => Err(FetchError::NotFound {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Err(e) => {
                counter!("binding_fetch_err_total", 1u64, "kind" => kind.plural());
                warn!(error = %e, %kind, ns = %namespace, name = %name, "fetch failed");
                Err(FetchError::Other(e.context(format!("get {} {}/{}", kind, namespace, name))))
            }
        }
    }
}
