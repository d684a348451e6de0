//! Platform-wide naming and placement settings

use serde::{Deserialize, Serialize};

/// Where resources go and what they are wired to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSettings {
    /// Namespace for workload and custom-domain resources
    pub workload_namespace: String,

    /// Namespace the platform's own pods run in
    pub system_namespace: String,

    /// Namespace for tenant database credentials
    pub data_namespace: String,

    /// Parent domain of generated workload hosts
    pub workload_domain: String,

    /// Value of the API endpoint reserved key
    pub api_endpoint: String,

    /// `app` label of the system pods workloads prefer to share a node with
    pub system_app_label: String,

    /// Wildcard TLS secret for generated workload hosts
    pub workload_tls_secret: String,

    /// Ingress entry point for HTTPS traffic
    pub secure_entry_point: String,

    pub certificate_issuer: String,
    pub certificate_issuer_kind: String,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            workload_namespace: "ferry-workloads".to_string(),
            system_namespace: "ferry-system".to_string(),
            data_namespace: "ferry-data".to_string(),
            workload_domain: "workers.ferry.local".to_string(),
            api_endpoint: "http://ferry-api.ferry-system.svc:8080".to_string(),
            system_app_label: "ferry-api".to_string(),
            workload_tls_secret: "worker-tls".to_string(),
            secure_entry_point: "websecure".to_string(),
            certificate_issuer: "zerossl-issuer".to_string(),
            certificate_issuer_kind: "ClusterIssuer".to_string(),
        }
    }
}
