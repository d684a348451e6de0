//! Kubernetes backend over the REST API

use crate::client::ClusterClient;
use crate::error::{ClusterError, ClusterResult};
use crate::manifest::{api_coordinates, from_manifest, to_manifest};
use crate::resources::{ClusterObject, ResourceKind};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Service account mount inside a pod
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Error body returned by the API server
#[derive(Debug, Default, Deserialize)]
struct Status {
    #[serde(default)]
    message: String,
    #[serde(default)]
    reason: String,
}

/// Talks to a Kubernetes API server with a bearer token
pub struct KubeCluster {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl KubeCluster {
    pub fn new(
        api_url: &str,
        token: Option<String>,
        accept_invalid_certs: bool,
    ) -> ClusterResult<Self> {
        Self::with_builder(api_url, token, Client::builder().danger_accept_invalid_certs(accept_invalid_certs))
    }

    /// Build from the service account mounted into the current pod
    pub fn in_cluster(api_url: Option<&str>, token_path: Option<&Path>) -> ClusterResult<Self> {
        let api_url = match api_url {
            Some(url) => url.to_string(),
            None => {
                let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
                    ClusterError::Transport("KUBERNETES_SERVICE_HOST is not set".into())
                })?;
                let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".into());
                format!("https://{host}:{port}")
            }
        };

        let dir = Path::new(SERVICE_ACCOUNT_DIR);
        let token_path = token_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| dir.join("token"));
        let token = std::fs::read_to_string(&token_path).map_err(|e| {
            ClusterError::Transport(format!("reading {}: {e}", token_path.display()))
        })?;

        let mut builder = Client::builder();
        let ca_path = dir.join("ca.crt");
        if let Ok(pem) = std::fs::read(&ca_path) {
            let cert = reqwest::Certificate::from_pem(&pem)?;
            builder = builder.add_root_certificate(cert);
        }

        Self::with_builder(&api_url, Some(token.trim().to_string()), builder)
    }

    fn with_builder(
        api_url: &str,
        token: Option<String>,
        builder: reqwest::ClientBuilder,
    ) -> ClusterResult<Self> {
        let client = builder.timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn collection_url(&self, kind: ResourceKind, namespace: &str) -> String {
        let (group, plural, _) = api_coordinates(kind);
        format!("{}/{}/namespaces/{}/{}", self.base_url, group, namespace, plural)
    }

    fn item_url(&self, kind: ResourceKind, namespace: &str, name: &str) -> String {
        format!("{}/{}", self.collection_url(kind, namespace), name)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn decode(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        response: reqwest::Response,
    ) -> ClusterResult<serde_json::Value> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let text = response.text().await.unwrap_or_default();
        let body: Status = serde_json::from_str(&text).unwrap_or_default();
        let (namespace, name) = (namespace.to_string(), name.to_string());

        Err(match status {
            StatusCode::NOT_FOUND => ClusterError::NotFound {
                kind,
                namespace,
                name,
            },
            StatusCode::CONFLICT if body.reason == "AlreadyExists" => {
                ClusterError::AlreadyExists {
                    kind,
                    namespace,
                    name,
                }
            }
            StatusCode::CONFLICT => ClusterError::Conflict {
                kind,
                namespace,
                name,
            },
            _ => ClusterError::Api {
                status: status.as_u16(),
                message: if body.message.is_empty() { text } else { body.message },
            },
        })
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<ClusterObject>> {
        let url = self.item_url(kind, namespace, name);
        let response = self.authorize(self.client.get(&url)).send().await?;
        match self.decode(kind, namespace, name, response).await {
            Ok(manifest) => from_manifest(kind, &manifest).map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create(&self, object: ClusterObject) -> ClusterResult<ClusterObject> {
        let kind = object.kind();
        let meta = object.metadata();
        let url = self.collection_url(kind, &meta.namespace);
        tracing::debug!(%kind, namespace = %meta.namespace, name = %meta.name, "Creating resource");

        let response = self
            .authorize(self.client.post(&url).json(&to_manifest(&object)))
            .send()
            .await?;
        let manifest = self.decode(kind, &meta.namespace, &meta.name, response).await?;
        from_manifest(kind, &manifest)
    }

    async fn update(&self, object: ClusterObject) -> ClusterResult<ClusterObject> {
        let kind = object.kind();
        let meta = object.metadata();
        let url = self.item_url(kind, &meta.namespace, &meta.name);
        tracing::debug!(%kind, namespace = %meta.namespace, name = %meta.name, "Replacing resource");

        let response = self
            .authorize(self.client.put(&url).json(&to_manifest(&object)))
            .send()
            .await?;
        let manifest = self.decode(kind, &meta.namespace, &meta.name, response).await?;
        from_manifest(kind, &manifest)
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> ClusterResult<()> {
        let url = self.item_url(kind, namespace, name);
        tracing::debug!(%kind, %namespace, %name, "Deleting resource");

        let response = self.authorize(self.client.delete(&url)).send().await?;
        self.decode(kind, namespace, name, response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let cluster = KubeCluster::new("https://kube.local:6443/", None, false).unwrap();
        assert_eq!(cluster.base_url, "https://kube.local:6443");
        assert_eq!(
            cluster.item_url(ResourceKind::Compute, "workers", "w-a-b"),
            "https://kube.local:6443/apis/apps/v1/namespaces/workers/deployments/w-a-b"
        );
        assert_eq!(
            cluster.collection_url(ResourceKind::RoutingRule, "workers"),
            "https://kube.local:6443/apis/traefik.io/v1alpha1/namespaces/workers/ingressroutes"
        );
        assert_eq!(
            cluster.collection_url(ResourceKind::SecretStore, "workers"),
            "https://kube.local:6443/api/v1/namespaces/workers/secrets"
        );
    }
}
