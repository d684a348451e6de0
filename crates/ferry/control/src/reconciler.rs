//! Workload reconciliation
//!
//! A pass runs five ensure steps in a fixed order and stops at the first
//! failure. Each step reads the live resource first and writes only when it
//! differs from the desired one, so repeated passes without drift are free.

use crate::error::ReconcileError;
use crate::settings::PlatformSettings;
use crate::store::WorkloadStore;
use ferry_cluster::{
    Api, ClusterClient, ClusterError, Colocation, Compute, ComputeSpec, ConfigStore, ContainerSpec,
    EnvSource, NetworkEntry, NetworkEntrySpec, ObjectMeta, Placement, RouteBackend, RoutingRule,
    RoutingRuleSpec, SecretStore, HOSTNAME_TOPOLOGY_KEY,
};
use ferry_types::{strip_reserved, WorkloadKey, WorkloadSpec, WorkloadStatus};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Co-location preference weight toward the system pods
pub const SYSTEM_AFFINITY_WEIGHT: i32 = 100;

/// The ordered reconcile steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileStep {
    ConfigStore,
    SecretStore,
    Compute,
    NetworkEntry,
    RoutingRule,
}

impl fmt::Display for ReconcileStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReconcileStep::ConfigStore => "ensure config store",
            ReconcileStep::SecretStore => "ensure secret store",
            ReconcileStep::Compute => "ensure compute",
            ReconcileStep::NetworkEntry => "ensure network entry",
            ReconcileStep::RoutingRule => "ensure routing rule",
        };
        f.write_str(s)
    }
}

/// Converges the cluster resources of one workload at a time
pub struct Reconciler {
    cluster: Arc<dyn ClusterClient>,
    settings: PlatformSettings,
}

impl Reconciler {
    pub fn new(cluster: Arc<dyn ClusterClient>, settings: PlatformSettings) -> Self {
        Self { cluster, settings }
    }

    pub fn settings(&self) -> &PlatformSettings {
        &self.settings
    }

    /// Run all five ensure steps in order
    pub async fn reconcile(&self, spec: &WorkloadSpec) -> Result<(), ReconcileError> {
        let name = spec.name();
        tracing::debug!(workload = %name, "Reconciling workload");

        self.ensure_config_store(spec)
            .await
            .map_err(|e| step_error(ReconcileStep::ConfigStore, &name, e))?;
        self.ensure_secret_store(spec)
            .await
            .map_err(|e| step_error(ReconcileStep::SecretStore, &name, e))?;
        self.ensure_compute(spec)
            .await
            .map_err(|e| step_error(ReconcileStep::Compute, &name, e))?;
        self.ensure_network_entry(spec)
            .await
            .map_err(|e| step_error(ReconcileStep::NetworkEntry, &name, e))?;
        self.ensure_routing_rule(spec)
            .await
            .map_err(|e| step_error(ReconcileStep::RoutingRule, &name, e))?;

        tracing::debug!(workload = %name, "Workload converged");
        Ok(())
    }

    /// Reconcile and write the phase back: `Deploying` first, then
    /// `Running` or `Failed` with the error message
    pub async fn reconcile_and_report<S>(&self, spec: &WorkloadSpec, store: &S) -> anyhow::Result<()>
    where
        S: WorkloadStore + ?Sized,
    {
        let key = spec.key();
        store.set_status(&key, WorkloadStatus::deploying()).await?;

        match self.reconcile(spec).await {
            Ok(()) => {
                store.set_status(&key, WorkloadStatus::running()).await?;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(workload = %key, step = %e.step, error = %e.source, "Reconcile failed");
                store
                    .set_status(&key, WorkloadStatus::failed(e.to_string()))
                    .await?;
                Err(e.into())
            }
        }
    }

    /// Delete all five sub-resources. Missing ones are skipped and every
    /// deletion is attempted; the first real error is returned.
    pub async fn delete_all(&self, key: &WorkloadKey) -> Result<(), ReconcileError> {
        let name = key.name();
        let ns = self.settings.workload_namespace.as_str();
        let client = self.cluster.as_ref();

        let results = [
            (
                ReconcileStep::RoutingRule,
                Api::<RoutingRule>::namespaced(client, ns).delete_if_exists(&name).await,
            ),
            (
                ReconcileStep::NetworkEntry,
                Api::<NetworkEntry>::namespaced(client, ns).delete_if_exists(&name).await,
            ),
            (
                ReconcileStep::Compute,
                Api::<Compute>::namespaced(client, ns).delete_if_exists(&name).await,
            ),
            (
                ReconcileStep::SecretStore,
                Api::<SecretStore>::namespaced(client, ns)
                    .delete_if_exists(&format!("{name}-secret"))
                    .await,
            ),
            (
                ReconcileStep::ConfigStore,
                Api::<ConfigStore>::namespaced(client, ns)
                    .delete_if_exists(&format!("{name}-env"))
                    .await,
            ),
        ];

        let mut first_error = None;
        for (step, result) in results {
            if let Err(e) = result {
                tracing::warn!(workload = %name, %step, error = %e, "Delete failed");
                if first_error.is_none() {
                    first_error = Some(step_error(step, &name, e));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                tracing::info!(workload = %name, "Workload resources deleted");
                Ok(())
            }
        }
    }

    /// Project the user's plain environment onto the config store, never
    /// letting a reserved key through
    pub async fn sync_config(
        &self,
        spec: &WorkloadSpec,
        config: &BTreeMap<String, String>,
    ) -> Result<(), ReconcileError> {
        let mut data = config.clone();
        if strip_reserved(&mut data) {
            tracing::warn!(workload = %spec.name(), "Dropped reserved keys from user config");
        }

        let api = Api::<ConfigStore>::namespaced(self.cluster.as_ref(), &self.settings.workload_namespace);
        let desired = ConfigStore {
            metadata: self.meta(spec, spec.config_store_name()),
            data,
        };
        self.replace_data(&api, desired, |live| &mut live.data)
            .await
            .map_err(|e| step_error(ReconcileStep::ConfigStore, &spec.name(), e))
    }

    /// Project the user's secrets onto the secret store, reserved keys last
    /// so they always win
    pub async fn sync_secrets(
        &self,
        spec: &WorkloadSpec,
        secrets: &BTreeMap<String, String>,
    ) -> Result<(), ReconcileError> {
        let mut data = secrets.clone();
        data.extend(spec.reserved_env(&self.settings.api_endpoint));

        let api = Api::<SecretStore>::namespaced(self.cluster.as_ref(), &self.settings.workload_namespace);
        let desired = SecretStore {
            metadata: self.meta(spec, spec.secret_store_name()),
            data,
        };
        self.replace_data(&api, desired, |live| &mut live.data)
            .await
            .map_err(|e| step_error(ReconcileStep::SecretStore, &spec.name(), e))
    }

    /// Host name routed to a workload
    pub fn routing_host(&self, spec: &WorkloadSpec) -> String {
        format!(
            "{}-{}.{}",
            spec.workload_id, spec.owner_id, self.settings.workload_domain
        )
    }

    pub fn desired_compute(&self, spec: &WorkloadSpec) -> Compute {
        let name = spec.name();
        let quantities = spec.quantities();
        let selector = BTreeMap::from([("app".to_string(), name.clone())]);

        Compute {
            metadata: self.meta(spec, name.clone()),
            spec: ComputeSpec {
                replicas: spec.replicas(),
                selector,
                pod_labels: spec.labels(),
                container: ContainerSpec {
                    name,
                    image: spec.image.clone(),
                    port: spec.port,
                    limits: quantities.clone(),
                    requests: quantities,
                    env_from: vec![
                        EnvSource::ConfigStore(spec.config_store_name()),
                        EnvSource::SecretStore(spec.secret_store_name()),
                    ],
                },
                placement: Placement {
                    preferred_colocation: Some(Colocation {
                        weight: SYSTEM_AFFINITY_WEIGHT,
                        match_labels: BTreeMap::from([(
                            "app".to_string(),
                            self.settings.system_app_label.clone(),
                        )]),
                        namespaces: vec![self.settings.system_namespace.clone()],
                        topology_key: HOSTNAME_TOPOLOGY_KEY.to_string(),
                    }),
                    required_region: spec
                        .region
                        .as_deref()
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .map(str::to_string),
                },
            },
        }
    }

    pub fn desired_network_entry(&self, spec: &WorkloadSpec) -> NetworkEntry {
        NetworkEntry {
            metadata: self.meta(spec, spec.name()),
            spec: NetworkEntrySpec::ClusterIp {
                selector: BTreeMap::from([("app".to_string(), spec.name())]),
                port: spec.port,
            },
        }
    }

    pub fn desired_routing_rule(&self, spec: &WorkloadSpec) -> RoutingRule {
        RoutingRule {
            metadata: self.meta(spec, spec.name()),
            spec: RoutingRuleSpec {
                entry_points: vec![self.settings.secure_entry_point.clone()],
                host: self.routing_host(spec),
                backend: RouteBackend {
                    service: spec.name(),
                    namespace: None,
                    port: spec.port,
                },
                tls_secret: Some(self.settings.workload_tls_secret.clone()),
            },
        }
    }

    async fn ensure_config_store(&self, spec: &WorkloadSpec) -> Result<(), ClusterError> {
        let api = Api::<ConfigStore>::namespaced(self.cluster.as_ref(), &self.settings.workload_namespace);
        let name = spec.config_store_name();

        match api.get(&name).await? {
            None => {
                api.create(ConfigStore {
                    metadata: self.meta(spec, name),
                    data: BTreeMap::new(),
                })
                .await?;
            }
            Some(mut live) => {
                if strip_reserved(&mut live.data) {
                    tracing::info!(workload = %spec.name(), "Removed reserved keys from config store");
                    api.update(live).await?;
                }
            }
        }
        Ok(())
    }

    async fn ensure_secret_store(&self, spec: &WorkloadSpec) -> Result<(), ClusterError> {
        let api = Api::<SecretStore>::namespaced(self.cluster.as_ref(), &self.settings.workload_namespace);
        let name = spec.secret_store_name();
        let reserved = spec.reserved_env(&self.settings.api_endpoint);

        match api.get(&name).await? {
            None => {
                api.create(SecretStore {
                    metadata: self.meta(spec, name),
                    data: reserved,
                })
                .await?;
            }
            Some(mut live) => {
                let stale = reserved
                    .iter()
                    .any(|(k, v)| live.data.get(k) != Some(v));
                if stale {
                    live.data.extend(reserved);
                    api.update(live).await?;
                }
            }
        }
        Ok(())
    }

    async fn ensure_compute(&self, spec: &WorkloadSpec) -> Result<(), ClusterError> {
        let api = Api::<Compute>::namespaced(self.cluster.as_ref(), &self.settings.workload_namespace);
        let desired = self.desired_compute(spec);

        match api.get(&desired.metadata.name).await? {
            None => {
                api.create(desired).await?;
            }
            Some(live) => {
                // replaced without a version check
                if live.spec != desired.spec || live.metadata.labels != desired.metadata.labels {
                    api.update(desired).await?;
                }
            }
        }
        Ok(())
    }

    async fn ensure_network_entry(&self, spec: &WorkloadSpec) -> Result<(), ClusterError> {
        let api = Api::<NetworkEntry>::namespaced(self.cluster.as_ref(), &self.settings.workload_namespace);
        if api.get(&spec.name()).await?.is_none() {
            api.create(self.desired_network_entry(spec)).await?;
        }
        Ok(())
    }

    async fn ensure_routing_rule(&self, spec: &WorkloadSpec) -> Result<(), ClusterError> {
        let api = Api::<RoutingRule>::namespaced(self.cluster.as_ref(), &self.settings.workload_namespace);
        let mut desired = self.desired_routing_rule(spec);

        match api.get(&desired.metadata.name).await? {
            None => {
                api.create(desired).await?;
            }
            Some(live) => {
                if live.spec != desired.spec || live.metadata.labels != desired.metadata.labels {
                    desired.metadata.resource_version = live.metadata.resource_version;
                    api.update(desired).await?;
                }
            }
        }
        Ok(())
    }

    /// Create `desired`, or replace the live data when it differs
    async fn replace_data<R, F>(&self, api: &Api<'_, R>, desired: R, data: F) -> Result<(), ClusterError>
    where
        R: ferry_cluster::Resource,
        F: Fn(&mut R) -> &mut BTreeMap<String, String>,
    {
        let name = ferry_cluster::Resource::metadata(&desired).name.clone();
        match api.get(&name).await? {
            None => {
                api.create(desired).await?;
            }
            Some(mut live) => {
                let mut desired = desired;
                let wanted = std::mem::take(data(&mut desired));
                let current = data(&mut live);
                if *current != wanted {
                    *current = wanted;
                    api.update(live).await?;
                }
            }
        }
        Ok(())
    }

    fn meta(&self, spec: &WorkloadSpec, name: String) -> ObjectMeta {
        ObjectMeta::new(self.settings.workload_namespace.clone(), name).with_labels(spec.labels())
    }
}

fn step_error(step: ReconcileStep, workload: &str, source: ClusterError) -> ReconcileError {
    ReconcileError {
        step,
        workload: workload.to_string(),
        source,
    }
}
