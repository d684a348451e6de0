//! In-memory storage implementation

use super::traits::*;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use ferry_jobs::JobRecord;
use ferry_types::{
    ClaimId, CustomDomain, DataResource, DataResourceId, DeployVersion, DomainStatus, OwnerId,
    Tenant, VersionId, WorkloadEnv, WorkloadKey, WorkloadSpec, WorkloadStatus,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory storage for development and testing
#[derive(Debug, Default)]
pub struct InMemoryStore {
    workloads: Arc<RwLock<BTreeMap<WorkloadKey, WorkloadSpec>>>,
    envs: Arc<RwLock<HashMap<WorkloadKey, WorkloadEnv>>>,
    statuses: Arc<RwLock<HashMap<WorkloadKey, WorkloadStatus>>>,
    versions: Arc<RwLock<BTreeMap<VersionId, DeployVersion>>>,
    claims: Arc<RwLock<HashMap<ClaimId, CustomDomain>>>,
    tenants: Arc<RwLock<HashMap<OwnerId, Tenant>>>,
    data_resources: Arc<RwLock<HashMap<DataResourceId, DataResource>>>,
    jobs: Arc<RwLock<Vec<JobRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkloadStore for InMemoryStore {
    async fn get_workload(&self, key: &WorkloadKey) -> StoreResult<Option<WorkloadSpec>> {
        Ok(self.workloads.read().await.get(key).cloned())
    }

    async fn list_workloads(&self) -> StoreResult<Vec<WorkloadSpec>> {
        Ok(self.workloads.read().await.values().cloned().collect())
    }

    async fn upsert_workload(&self, spec: WorkloadSpec) -> StoreResult<()> {
        self.workloads.write().await.insert(spec.key(), spec);
        Ok(())
    }

    async fn delete_workload(&self, key: &WorkloadKey) -> StoreResult<bool> {
        self.envs.write().await.remove(key);
        self.statuses.write().await.remove(key);
        Ok(self.workloads.write().await.remove(key).is_some())
    }

    async fn get_env(&self, key: &WorkloadKey) -> StoreResult<WorkloadEnv> {
        Ok(self.envs.read().await.get(key).cloned().unwrap_or_default())
    }

    async fn put_env(&self, key: &WorkloadKey, env: WorkloadEnv) -> StoreResult<()> {
        self.envs.write().await.insert(key.clone(), env);
        Ok(())
    }

    async fn get_status(&self, key: &WorkloadKey) -> StoreResult<Option<WorkloadStatus>> {
        Ok(self.statuses.read().await.get(key).cloned())
    }

    async fn set_status(&self, key: &WorkloadKey, status: WorkloadStatus) -> StoreResult<()> {
        self.statuses.write().await.insert(key.clone(), status);
        Ok(())
    }
}

#[async_trait]
impl VersionStore for InMemoryStore {
    async fn get_version(&self, id: VersionId) -> StoreResult<Option<DeployVersion>> {
        Ok(self.versions.read().await.get(&id).cloned())
    }

    async fn upsert_version(&self, version: DeployVersion) -> StoreResult<()> {
        self.versions
            .write()
            .await
            .insert(version.version_id, version);
        Ok(())
    }

    async fn list_versions(&self, key: &WorkloadKey) -> StoreResult<Vec<DeployVersion>> {
        Ok(self
            .versions
            .read()
            .await
            .values()
            .filter(|v| v.workload_id == key.workload_id && v.owner_id == key.owner_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DomainStore for InMemoryStore {
    async fn get_claim(&self, id: &ClaimId) -> StoreResult<Option<CustomDomain>> {
        Ok(self.claims.read().await.get(id).cloned())
    }

    async fn list_claims(&self) -> StoreResult<Vec<CustomDomain>> {
        let mut claims: Vec<_> = self.claims.read().await.values().cloned().collect();
        claims.sort_by_key(|c| c.created_at);
        Ok(claims)
    }

    async fn insert_claim(&self, claim: CustomDomain) -> StoreResult<()> {
        let mut claims = self.claims.write().await;
        if claims.contains_key(&claim.claim_id) {
            return Err(StoreError::Conflict(format!("claim {}", claim.claim_id)));
        }
        claims.insert(claim.claim_id.clone(), claim);
        Ok(())
    }

    async fn transition_claim(
        &self,
        id: &ClaimId,
        from: DomainStatus,
        to: DomainStatus,
    ) -> StoreResult<bool> {
        let mut claims = self.claims.write().await;
        match claims.get_mut(id) {
            Some(claim) if claim.status == from => {
                claim.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_claim(&self, id: &ClaimId) -> StoreResult<bool> {
        Ok(self.claims.write().await.remove(id).is_some())
    }
}

#[async_trait]
impl TenantStore for InMemoryStore {
    async fn get_tenant(&self, owner: &OwnerId) -> StoreResult<Option<Tenant>> {
        Ok(self.tenants.read().await.get(owner).cloned())
    }

    async fn upsert_tenant(&self, tenant: Tenant) -> StoreResult<()> {
        self.tenants
            .write()
            .await
            .insert(tenant.owner_id.clone(), tenant);
        Ok(())
    }
}

#[async_trait]
impl DataResourceStore for InMemoryStore {
    async fn get_data_resource(&self, id: &DataResourceId) -> StoreResult<Option<DataResource>> {
        Ok(self.data_resources.read().await.get(id).cloned())
    }

    async fn list_data_resources(&self, owner: &OwnerId) -> StoreResult<Vec<DataResource>> {
        Ok(self
            .data_resources
            .read()
            .await
            .values()
            .filter(|r| &r.owner_id == owner)
            .cloned()
            .collect())
    }

    async fn upsert_data_resource(&self, resource: DataResource) -> StoreResult<()> {
        self.data_resources
            .write()
            .await
            .insert(resource.resource_id.clone(), resource);
        Ok(())
    }

    async fn delete_data_resource(&self, id: &DataResourceId) -> StoreResult<bool> {
        Ok(self.data_resources.write().await.remove(id).is_some())
    }
}

#[async_trait]
impl AuditStore for InMemoryStore {
    async fn record_job(&self, record: JobRecord) -> StoreResult<()> {
        self.jobs.write().await.push(record);
        Ok(())
    }

    async fn recent_jobs(&self, limit: usize) -> StoreResult<Vec<JobRecord>> {
        Ok(self
            .jobs
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_workload_roundtrip() {
        let store = InMemoryStore::new();
        let spec = WorkloadSpec::new("abc123", "u1", "nginx:latest", 8080);
        let key = spec.key();

        store.upsert_workload(spec.clone()).await.unwrap();
        assert_eq!(store.get_workload(&key).await.unwrap(), Some(spec));
        assert_eq!(store.get_env(&key).await.unwrap(), WorkloadEnv::default());

        store.set_status(&key, WorkloadStatus::running()).await.unwrap();
        assert!(store.delete_workload(&key).await.unwrap());
        assert!(store.get_status(&key).await.unwrap().is_none());
        assert!(!store.delete_workload(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_transition_is_conditional() {
        let store = InMemoryStore::new();
        let claim = CustomDomain::new("u1", "example.com", "app.svc.example.net");
        let id = claim.claim_id.clone();
        store.insert_claim(claim.clone()).await.unwrap();

        assert!(matches!(
            store.insert_claim(claim).await,
            Err(StoreError::Conflict(_))
        ));

        assert!(store
            .transition_claim(&id, DomainStatus::Pending, DomainStatus::Success)
            .await
            .unwrap());
        assert!(!store
            .transition_claim(&id, DomainStatus::Pending, DomainStatus::Error)
            .await
            .unwrap());
        assert_eq!(
            store.get_claim(&id).await.unwrap().unwrap().status,
            DomainStatus::Success
        );

        let missing = ClaimId::new("deadbeef");
        assert!(!store
            .transition_claim(&missing, DomainStatus::Pending, DomainStatus::Error)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_versions_filtered_by_workload() {
        let store = InMemoryStore::new();
        let a = WorkloadKey::new("a", "u1");
        let b = WorkloadKey::new("b", "u1");
        store
            .upsert_version(DeployVersion::new(VersionId(1), &a, "img:1", 80))
            .await
            .unwrap();
        store
            .upsert_version(DeployVersion::new(VersionId(2), &b, "img:2", 80))
            .await
            .unwrap();
        store
            .upsert_version(DeployVersion::new(VersionId(3), &a, "img:3", 80))
            .await
            .unwrap();

        let ids: Vec<u64> = store
            .list_versions(&a)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.version_id.0)
            .collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
