//! Control-plane job variants
//!
//! Every job carries identifiers only and re-reads the persisted records it
//! needs when it executes.

mod domain;
mod periodic;
mod tenant;
mod workload;

pub use domain::VerifyDomainJob;
pub use periodic::{AuditWorkloadsJob, DomainCheckJob};
pub use tenant::{tenant_secret_name, CreateDataResourceJob, DeleteDataResourceJob, RegisterTenantJob};
pub use workload::{DeployWorkloadJob, DeleteWorkloadJob, SyncConfigJob, SyncSecretJob};

use crate::data_plane::DataPlane;
use crate::reconciler::Reconciler;
use crate::settings::PlatformSettings;
use crate::store::Store;
use ferry_cluster::ClusterClient;
use std::sync::Arc;

pub const DEPLOY_WORKLOAD: &str = "workload.deploy";
pub const SYNC_CONFIG: &str = "workload.sync_config";
pub const SYNC_SECRET: &str = "workload.sync_secret";
pub const DELETE_WORKLOAD: &str = "workload.delete_resources";
pub const REGISTER_TENANT: &str = "tenant.register";
pub const CREATE_DATA_RESOURCE: &str = "data.create";
pub const DELETE_DATA_RESOURCE: &str = "data.delete";
pub const AUDIT_WORKLOADS: &str = "cron.audit_workloads";
pub const DOMAIN_CHECK: &str = "cron.domain_check";
pub const VERIFY_DOMAIN: &str = "domain.verify";

/// Shared handles the job variants execute against
#[derive(Clone)]
pub struct ControlContext {
    pub store: Arc<dyn Store>,
    pub cluster: Arc<dyn ClusterClient>,
    pub reconciler: Arc<Reconciler>,
    pub data_plane: Arc<dyn DataPlane>,
    pub settings: PlatformSettings,
}

impl ControlContext {
    pub fn new(
        store: Arc<dyn Store>,
        cluster: Arc<dyn ClusterClient>,
        data_plane: Arc<dyn DataPlane>,
        settings: PlatformSettings,
    ) -> Self {
        let reconciler = Arc::new(Reconciler::new(cluster.clone(), settings.clone()));
        Self {
            store,
            cluster,
            reconciler,
            data_plane,
            settings,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::data_plane::InMemoryDataPlane;
    use crate::store::InMemoryStore;
    use ferry_cluster::InMemoryCluster;

    pub(crate) struct Harness {
        pub store: Arc<InMemoryStore>,
        pub cluster: Arc<InMemoryCluster>,
        pub data_plane: Arc<InMemoryDataPlane>,
        pub ctx: Arc<ControlContext>,
    }

    pub(crate) fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let cluster = Arc::new(InMemoryCluster::new());
        let data_plane = Arc::new(InMemoryDataPlane::new());
        let ctx = Arc::new(ControlContext::new(
            store.clone(),
            cluster.clone(),
            data_plane.clone(),
            PlatformSettings::default(),
        ));
        Harness {
            store,
            cluster,
            data_plane,
            ctx,
        }
    }
}
