//! Routing and certificate provisioning for verified custom domains

use crate::error::ProvisionError;
use crate::settings::PlatformSettings;
use ferry_cluster::{
    Api, CertificateRequest, CertificateSpec, ClusterClient, ClusterError, IssuerRef, NetworkEntry,
    NetworkEntrySpec, ObjectMeta, Resource, RouteBackend, RoutingRule, RoutingRuleSpec,
};
use ferry_types::{claim_resource_name, ClaimId, CustomDomain};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Port custom-domain routes forward to
pub const CUSTOM_DOMAIN_PORT: u16 = 443;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    NetworkEntry,
    Certificate,
    RoutingRule,
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProvisionStep::NetworkEntry => "provision network entry",
            ProvisionStep::Certificate => "request certificate",
            ProvisionStep::RoutingRule => "provision routing rule",
        };
        f.write_str(s)
    }
}

pub struct DomainProvisioner {
    cluster: Arc<dyn ClusterClient>,
    settings: PlatformSettings,
}

impl DomainProvisioner {
    pub fn new(cluster: Arc<dyn ClusterClient>, settings: PlatformSettings) -> Self {
        Self { cluster, settings }
    }

    /// Create the external-name entry, certificate and routing rule in that
    /// order, stopping at the first failure
    pub async fn provision(&self, claim: &CustomDomain) -> Result<(), ProvisionError> {
        let fail = |step| {
            let claim_id = claim.claim_id.to_string();
            move |source| ProvisionError {
                step,
                claim_id,
                source,
            }
        };

        self.ensure(self.network_entry(claim))
            .await
            .map_err(fail(ProvisionStep::NetworkEntry))?;
        self.ensure(self.certificate(claim))
            .await
            .map_err(fail(ProvisionStep::Certificate))?;
        self.ensure(self.routing_rule(claim))
            .await
            .map_err(fail(ProvisionStep::RoutingRule))?;

        tracing::info!(claim_id = %claim.claim_id, domain = %claim.domain, "Custom domain provisioned");
        Ok(())
    }

    /// Best-effort removal of everything provisioned for a claim. Missing
    /// resources are not errors; the first real error is returned after all
    /// deletions were attempted.
    pub async fn deprovision(&self, claim_id: &ClaimId) -> Result<(), ClusterError> {
        let name = claim_resource_name(claim_id);
        let ns = self.settings.workload_namespace.as_str();
        let client = self.cluster.as_ref();

        let results = [
            Api::<RoutingRule>::namespaced(client, ns).delete_if_exists(&name).await,
            Api::<CertificateRequest>::namespaced(client, ns)
                .delete_if_exists(&name)
                .await,
            Api::<NetworkEntry>::namespaced(client, ns).delete_if_exists(&name).await,
        ];

        let mut first_error = None;
        for result in results {
            if let Err(e) = result {
                tracing::warn!(claim_id = %claim_id, error = %e, "Custom domain cleanup failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn network_entry(&self, claim: &CustomDomain) -> NetworkEntry {
        NetworkEntry {
            metadata: self.meta(claim),
            spec: NetworkEntrySpec::ExternalName {
                external_name: claim.target.clone(),
            },
        }
    }

    pub fn certificate(&self, claim: &CustomDomain) -> CertificateRequest {
        CertificateRequest {
            metadata: self.meta(claim),
            spec: CertificateSpec {
                secret_name: claim.tls_secret_name(),
                dns_names: vec![claim.domain.clone()],
                issuer: IssuerRef {
                    name: self.settings.certificate_issuer.clone(),
                    kind: self.settings.certificate_issuer_kind.clone(),
                },
            },
        }
    }

    pub fn routing_rule(&self, claim: &CustomDomain) -> RoutingRule {
        RoutingRule {
            metadata: self.meta(claim),
            spec: RoutingRuleSpec {
                entry_points: vec![self.settings.secure_entry_point.clone()],
                host: claim.domain.clone(),
                backend: RouteBackend {
                    service: claim.resource_name(),
                    namespace: None,
                    port: CUSTOM_DOMAIN_PORT,
                },
                tls_secret: Some(claim.tls_secret_name()),
            },
        }
    }

    /// Create, or replace a differing live resource left by an earlier attempt
    async fn ensure<R: Resource>(&self, mut desired: R) -> Result<(), ClusterError> {
        let api = Api::<R>::namespaced(self.cluster.as_ref(), &self.settings.workload_namespace);
        let name = desired.metadata().name.clone();
        match api.get(&name).await? {
            None => {
                api.create(desired).await?;
            }
            Some(live) => {
                desired.metadata_mut().resource_version = live.metadata().resource_version.clone();
                if live != desired {
                    api.update(desired).await?;
                }
            }
        }
        Ok(())
    }

    fn meta(&self, claim: &CustomDomain) -> ObjectMeta {
        let labels = BTreeMap::from([
            ("app".to_string(), "custom-domain".to_string()),
            ("owner-id".to_string(), claim.owner_id.to_string()),
        ]);
        ObjectMeta::new(self.settings.workload_namespace.clone(), claim.resource_name())
            .with_labels(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_cluster::{InMemoryCluster, Operation, ResourceKind};

    fn setup() -> (Arc<InMemoryCluster>, DomainProvisioner, CustomDomain) {
        let cluster = Arc::new(InMemoryCluster::new());
        let provisioner = DomainProvisioner::new(cluster.clone(), PlatformSettings::default());
        let claim = CustomDomain::new("u1", "example.com", "app.svc.example.net");
        (cluster, provisioner, claim)
    }

    #[tokio::test]
    async fn test_provision_creates_three_resources() {
        let (cluster, provisioner, claim) = setup();
        provisioner.provision(&claim).await.unwrap();

        let ns = "ferry-workloads";
        let name = claim.resource_name();
        let rule = Api::<RoutingRule>::namespaced(cluster.as_ref(), ns)
            .get(&name)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rule.spec.host, "example.com");
        assert_eq!(rule.spec.backend.port, 443);
        assert_eq!(rule.spec.tls_secret, Some(format!("custom-domain-tls-{}", claim.claim_id)));
        assert_eq!(rule.metadata.labels["app"], "custom-domain");
        assert_eq!(rule.metadata.labels["owner-id"], "u1");

        let cert = Api::<CertificateRequest>::namespaced(cluster.as_ref(), ns)
            .get(&name)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cert.spec.dns_names, vec!["example.com".to_string()]);
        assert_eq!(cert.spec.issuer.name, "zerossl-issuer");
        assert_eq!(cert.spec.issuer.kind, "ClusterIssuer");

        let entry = Api::<NetworkEntry>::namespaced(cluster.as_ref(), ns)
            .get(&name)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            entry.spec,
            NetworkEntrySpec::ExternalName {
                external_name: "app.svc.example.net".into()
            }
        );

        let before = cluster.mutation_count().await;
        provisioner.provision(&claim).await.unwrap();
        assert_eq!(cluster.mutation_count().await, before);
    }

    #[tokio::test]
    async fn test_failure_stops_provisioning() {
        let (cluster, provisioner, claim) = setup();
        cluster
            .fail_on(ResourceKind::Certificate, Operation::Create, "issuer missing")
            .await;

        let err = provisioner.provision(&claim).await.unwrap_err();
        assert_eq!(err.step, ProvisionStep::Certificate);
        assert_eq!(cluster.count(ResourceKind::NetworkEntry).await, 1);
        assert_eq!(cluster.count(ResourceKind::RoutingRule).await, 0);
    }

    #[tokio::test]
    async fn test_deprovision_tolerates_missing() {
        let (cluster, provisioner, claim) = setup();
        provisioner.deprovision(&claim.claim_id).await.unwrap();

        provisioner.provision(&claim).await.unwrap();
        provisioner.deprovision(&claim.claim_id).await.unwrap();
        assert_eq!(cluster.count(ResourceKind::NetworkEntry).await, 0);
        assert_eq!(cluster.count(ResourceKind::Certificate).await, 0);
        assert_eq!(cluster.count(ResourceKind::RoutingRule).await, 0);
    }
}
