//! PostgreSQL storage implementation

use super::traits::*;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use ferry_jobs::JobRecord;
use ferry_types::{
    ClaimId, CustomDomain, DataResource, DataResourceId, DeployVersion, DomainStatus, OwnerId,
    Tenant, VersionId, WorkloadEnv, WorkloadKey, WorkloadSpec, WorkloadStatus,
};
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;

/// PostgreSQL-backed storage
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL and initialize schema
    pub async fn new(url: &str, max_connections: u32, connect_timeout_secs: u64) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    async fn initialize_schema(&self) -> StoreResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS workloads (
                workload_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                data JSONB NOT NULL,
                env JSONB,
                status JSONB,
                updated_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (workload_id, owner_id)
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS deploy_versions (
                id BIGINT PRIMARY KEY,
                workload_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS deploy_versions_workload ON deploy_versions(workload_id, owner_id);"#,
            r#"
            CREATE TABLE IF NOT EXISTS domain_claims (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                owner_id TEXT PRIMARY KEY,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS data_resources (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS data_resources_owner ON data_resources(owner_id);"#,
            r#"
            CREATE TABLE IF NOT EXISTS job_records (
                sequence BIGSERIAL PRIMARY KEY,
                job_type TEXT NOT NULL,
                job_id TEXT NOT NULL,
                finished_at TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL
            );
            "#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(query_error)?;
        }

        Ok(())
    }

    fn to_json<T: serde::Serialize>(value: &T) -> StoreResult<Value> {
        serde_json::to_value(value)
            .map_err(|e| StoreError::InvalidData(format!("json serialize error: {}", e)))
    }

    fn from_json<T: serde::de::DeserializeOwned>(value: Value) -> StoreResult<T> {
        serde_json::from_value(value)
            .map_err(|e| StoreError::InvalidData(format!("json deserialize error: {}", e)))
    }

    fn column<T: serde::de::DeserializeOwned>(row: &PgRow, name: &str) -> StoreResult<Option<T>> {
        let data: Option<Value> = row.try_get(name).map_err(query_error)?;
        data.map(Self::from_json).transpose()
    }

    fn data<T: serde::de::DeserializeOwned>(row: PgRow) -> StoreResult<T> {
        Self::column(&row, "data")?
            .ok_or_else(|| StoreError::InvalidData("row without data".to_string()))
    }
}

fn query_error(e: sqlx::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

#[async_trait]
impl WorkloadStore for PostgresStore {
    async fn get_workload(&self, key: &WorkloadKey) -> StoreResult<Option<WorkloadSpec>> {
        let row = sqlx::query("SELECT data FROM workloads WHERE workload_id = $1 AND owner_id = $2")
            .bind(key.workload_id.as_str())
            .bind(key.owner_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.map(Self::data).transpose()
    }

    async fn list_workloads(&self) -> StoreResult<Vec<WorkloadSpec>> {
        let rows = sqlx::query("SELECT data FROM workloads ORDER BY owner_id, workload_id")
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        rows.into_iter().map(Self::data).collect()
    }

    async fn upsert_workload(&self, spec: WorkloadSpec) -> StoreResult<()> {
        let data = Self::to_json(&spec)?;
        sqlx::query(
            r#"
            INSERT INTO workloads (workload_id, owner_id, data, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (workload_id, owner_id)
            DO UPDATE SET data = EXCLUDED.data, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(spec.workload_id.as_str())
        .bind(spec.owner_id.as_str())
        .bind(data)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(())
    }

    async fn delete_workload(&self, key: &WorkloadKey) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM workloads WHERE workload_id = $1 AND owner_id = $2")
            .bind(key.workload_id.as_str())
            .bind(key.owner_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_env(&self, key: &WorkloadKey) -> StoreResult<WorkloadEnv> {
        let row = sqlx::query("SELECT env FROM workloads WHERE workload_id = $1 AND owner_id = $2")
            .bind(key.workload_id.as_str())
            .bind(key.owner_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        match row {
            Some(row) => Ok(Self::column(&row, "env")?.unwrap_or_default()),
            None => Ok(WorkloadEnv::default()),
        }
    }

    async fn put_env(&self, key: &WorkloadKey, env: WorkloadEnv) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE workloads SET env = $3, updated_at = $4 WHERE workload_id = $1 AND owner_id = $2",
        )
        .bind(key.workload_id.as_str())
        .bind(key.owner_id.as_str())
        .bind(Self::to_json(&env)?)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("workload {}", key)));
        }
        Ok(())
    }

    async fn get_status(&self, key: &WorkloadKey) -> StoreResult<Option<WorkloadStatus>> {
        let row = sqlx::query("SELECT status FROM workloads WHERE workload_id = $1 AND owner_id = $2")
            .bind(key.workload_id.as_str())
            .bind(key.owner_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        match row {
            Some(row) => Self::column(&row, "status"),
            None => Ok(None),
        }
    }

    async fn set_status(&self, key: &WorkloadKey, status: WorkloadStatus) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE workloads SET status = $3, updated_at = $4 WHERE workload_id = $1 AND owner_id = $2",
        )
        .bind(key.workload_id.as_str())
        .bind(key.owner_id.as_str())
        .bind(Self::to_json(&status)?)
        .bind(status.updated_at)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("workload {}", key)));
        }
        Ok(())
    }
}

#[async_trait]
impl VersionStore for PostgresStore {
    async fn get_version(&self, id: VersionId) -> StoreResult<Option<DeployVersion>> {
        let row = sqlx::query("SELECT data FROM deploy_versions WHERE id = $1")
            .bind(id.0 as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.map(Self::data).transpose()
    }

    async fn upsert_version(&self, version: DeployVersion) -> StoreResult<()> {
        let data = Self::to_json(&version)?;
        sqlx::query(
            r#"
            INSERT INTO deploy_versions (id, workload_id, owner_id, data, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id)
            DO UPDATE SET data = EXCLUDED.data, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(version.version_id.0 as i64)
        .bind(version.workload_id.as_str())
        .bind(version.owner_id.as_str())
        .bind(data)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(())
    }

    async fn list_versions(&self, key: &WorkloadKey) -> StoreResult<Vec<DeployVersion>> {
        let rows = sqlx::query(
            "SELECT data FROM deploy_versions WHERE workload_id = $1 AND owner_id = $2 ORDER BY id",
        )
        .bind(key.workload_id.as_str())
        .bind(key.owner_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        rows.into_iter().map(Self::data).collect()
    }
}

#[async_trait]
impl DomainStore for PostgresStore {
    async fn get_claim(&self, id: &ClaimId) -> StoreResult<Option<CustomDomain>> {
        let row = sqlx::query("SELECT data FROM domain_claims WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.map(Self::data).transpose()
    }

    async fn list_claims(&self) -> StoreResult<Vec<CustomDomain>> {
        let rows = sqlx::query("SELECT data FROM domain_claims ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        rows.into_iter().map(Self::data).collect()
    }

    async fn insert_claim(&self, claim: CustomDomain) -> StoreResult<()> {
        let data = Self::to_json(&claim)?;
        let result = sqlx::query(
            r#"
            INSERT INTO domain_claims (id, status, data, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(claim.claim_id.as_str())
        .bind(claim.status.as_str())
        .bind(data)
        .bind(claim.created_at)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("claim {}", claim.claim_id)));
        }
        Ok(())
    }

    async fn transition_claim(
        &self,
        id: &ClaimId,
        from: DomainStatus,
        to: DomainStatus,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE domain_claims
            SET status = $3, data = jsonb_set(data, '{status}', to_jsonb($3::text))
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id.as_str())
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_claim(&self, id: &ClaimId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM domain_claims WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TenantStore for PostgresStore {
    async fn get_tenant(&self, owner: &OwnerId) -> StoreResult<Option<Tenant>> {
        let row = sqlx::query("SELECT data FROM tenants WHERE owner_id = $1")
            .bind(owner.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.map(Self::data).transpose()
    }

    async fn upsert_tenant(&self, tenant: Tenant) -> StoreResult<()> {
        let data = Self::to_json(&tenant)?;
        sqlx::query(
            r#"
            INSERT INTO tenants (owner_id, data, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (owner_id)
            DO UPDATE SET data = EXCLUDED.data, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(tenant.owner_id.as_str())
        .bind(data)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(())
    }
}

#[async_trait]
impl DataResourceStore for PostgresStore {
    async fn get_data_resource(&self, id: &DataResourceId) -> StoreResult<Option<DataResource>> {
        let row = sqlx::query("SELECT data FROM data_resources WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.map(Self::data).transpose()
    }

    async fn list_data_resources(&self, owner: &OwnerId) -> StoreResult<Vec<DataResource>> {
        let rows = sqlx::query("SELECT data FROM data_resources WHERE owner_id = $1 ORDER BY id")
            .bind(owner.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        rows.into_iter().map(Self::data).collect()
    }

    async fn upsert_data_resource(&self, resource: DataResource) -> StoreResult<()> {
        let data = Self::to_json(&resource)?;
        sqlx::query(
            r#"
            INSERT INTO data_resources (id, owner_id, data, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id)
            DO UPDATE SET owner_id = EXCLUDED.owner_id, data = EXCLUDED.data, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(resource.resource_id.as_str())
        .bind(resource.owner_id.as_str())
        .bind(data)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(())
    }

    async fn delete_data_resource(&self, id: &DataResourceId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM data_resources WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AuditStore for PostgresStore {
    async fn record_job(&self, record: JobRecord) -> StoreResult<()> {
        let data = Self::to_json(&record)?;
        sqlx::query(
            "INSERT INTO job_records (job_type, job_id, finished_at, data) VALUES ($1, $2, $3, $4)",
        )
        .bind(&record.job_type)
        .bind(&record.job_id)
        .bind(record.finished_at)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(())
    }

    async fn recent_jobs(&self, limit: usize) -> StoreResult<Vec<JobRecord>> {
        let rows = sqlx::query("SELECT data FROM job_records ORDER BY sequence DESC LIMIT $1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        rows.into_iter().map(Self::data).collect()
    }
}
