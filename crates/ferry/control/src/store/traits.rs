//! Storage trait definitions

use crate::error::StoreResult;
use async_trait::async_trait;
use ferry_jobs::JobRecord;
use ferry_types::{
    ClaimId, CustomDomain, DataResource, DataResourceId, DeployVersion, DomainStatus, OwnerId,
    Tenant, VersionId, WorkloadEnv, WorkloadKey, WorkloadSpec, WorkloadStatus,
};

/// Combined storage trait
pub trait Store:
    WorkloadStore + VersionStore + DomainStore + TenantStore + DataResourceStore + AuditStore + Send + Sync
{
}

impl<T> Store for T where
    T: WorkloadStore + VersionStore + DomainStore + TenantStore + DataResourceStore + AuditStore + Send + Sync
{
}

/// Workload descriptors, their environment and their reported phase
#[async_trait]
pub trait WorkloadStore: Send + Sync {
    async fn get_workload(&self, key: &WorkloadKey) -> StoreResult<Option<WorkloadSpec>>;

    async fn list_workloads(&self) -> StoreResult<Vec<WorkloadSpec>>;

    async fn upsert_workload(&self, spec: WorkloadSpec) -> StoreResult<()>;

    /// Delete a workload together with its environment and status
    async fn delete_workload(&self, key: &WorkloadKey) -> StoreResult<bool>;

    /// Persisted environment; empty when none was recorded
    async fn get_env(&self, key: &WorkloadKey) -> StoreResult<WorkloadEnv>;

    async fn put_env(&self, key: &WorkloadKey, env: WorkloadEnv) -> StoreResult<()>;

    async fn get_status(&self, key: &WorkloadKey) -> StoreResult<Option<WorkloadStatus>>;

    async fn set_status(&self, key: &WorkloadKey, status: WorkloadStatus) -> StoreResult<()>;
}

/// Deploy versions
#[async_trait]
pub trait VersionStore: Send + Sync {
    async fn get_version(&self, id: VersionId) -> StoreResult<Option<DeployVersion>>;

    async fn upsert_version(&self, version: DeployVersion) -> StoreResult<()>;

    /// Versions of one workload, oldest first
    async fn list_versions(&self, key: &WorkloadKey) -> StoreResult<Vec<DeployVersion>>;
}

/// Custom-domain claims
#[async_trait]
pub trait DomainStore: Send + Sync {
    async fn get_claim(&self, id: &ClaimId) -> StoreResult<Option<CustomDomain>>;

    async fn list_claims(&self) -> StoreResult<Vec<CustomDomain>>;

    /// Insert a new claim; `Conflict` if the id is taken
    async fn insert_claim(&self, claim: CustomDomain) -> StoreResult<()>;

    /// Move a claim from `from` to `to`. Returns false, changing nothing,
    /// when the claim is missing or not in `from`.
    async fn transition_claim(
        &self,
        id: &ClaimId,
        from: DomainStatus,
        to: DomainStatus,
    ) -> StoreResult<bool>;

    async fn delete_claim(&self, id: &ClaimId) -> StoreResult<bool>;
}

/// Tenants
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn get_tenant(&self, owner: &OwnerId) -> StoreResult<Option<Tenant>>;

    async fn upsert_tenant(&self, tenant: Tenant) -> StoreResult<()>;
}

/// Tenant data resources
#[async_trait]
pub trait DataResourceStore: Send + Sync {
    async fn get_data_resource(&self, id: &DataResourceId) -> StoreResult<Option<DataResource>>;

    async fn list_data_resources(&self, owner: &OwnerId) -> StoreResult<Vec<DataResource>>;

    async fn upsert_data_resource(&self, resource: DataResource) -> StoreResult<()>;

    async fn delete_data_resource(&self, id: &DataResourceId) -> StoreResult<bool>;
}

/// Job execution audit trail
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn record_job(&self, record: JobRecord) -> StoreResult<()>;

    /// Most recent records, newest first
    async fn recent_jobs(&self, limit: usize) -> StoreResult<Vec<JobRecord>>;
}
