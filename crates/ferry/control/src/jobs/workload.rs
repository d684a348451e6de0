use super::{ControlContext, DELETE_WORKLOAD, DEPLOY_WORKLOAD, SYNC_CONFIG, SYNC_SECRET};
use crate::store::{VersionStore, WorkloadStore};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use ferry_jobs::Job;
use ferry_types::{VersionId, VersionStatus, WorkloadKey, WorkloadSpec};
use std::sync::Arc;

async fn load_workload(ctx: &ControlContext, key: &WorkloadKey) -> anyhow::Result<WorkloadSpec> {
    ctx.store
        .get_workload(key)
        .await?
        .ok_or_else(|| anyhow!("workload {key} not found"))
}

/// Apply a deploy version (when given) and reconcile the workload
pub struct DeployWorkloadJob {
    ctx: Arc<ControlContext>,
    key: WorkloadKey,
    version: Option<VersionId>,
}

impl DeployWorkloadJob {
    pub fn new(ctx: Arc<ControlContext>, key: WorkloadKey, version: Option<VersionId>) -> Self {
        Self { ctx, key, version }
    }
}

#[async_trait]
impl Job for DeployWorkloadJob {
    fn job_type(&self) -> &'static str {
        DEPLOY_WORKLOAD
    }

    fn id(&self) -> String {
        match self.version {
            Some(version) => format!("{}@{}", self.key, version),
            None => self.key.to_string(),
        }
    }

    async fn execute(&self) -> anyhow::Result<()> {
        let store = self.ctx.store.as_ref();
        let mut spec = load_workload(&self.ctx, &self.key).await?;

        let version = match self.version {
            Some(id) => {
                let version = store
                    .get_version(id)
                    .await?
                    .ok_or_else(|| anyhow!("version {id} not found"))?;
                if version.key() != self.key {
                    bail!("version {id} belongs to {}, not {}", version.key(), self.key);
                }
                spec.apply_version(&version);
                store.upsert_workload(spec.clone()).await?;
                tracing::info!(workload = %self.key, version = %id, image = %version.image, "Applying deploy version");
                Some(version)
            }
            None => None,
        };

        let result = self.ctx.reconciler.reconcile_and_report(&spec, store).await;

        if let Some(mut version) = version {
            match &result {
                Ok(()) => {
                    version.status = VersionStatus::Success;
                    version.message = None;
                }
                Err(e) => {
                    version.status = VersionStatus::Error;
                    version.message = Some(format!("{e:#}"));
                }
            }
            store.upsert_version(version).await?;
        }

        result
    }
}

/// Project the persisted plain environment onto the config store
pub struct SyncConfigJob {
    ctx: Arc<ControlContext>,
    key: WorkloadKey,
}

impl SyncConfigJob {
    pub fn new(ctx: Arc<ControlContext>, key: WorkloadKey) -> Self {
        Self { ctx, key }
    }
}

#[async_trait]
impl Job for SyncConfigJob {
    fn job_type(&self) -> &'static str {
        SYNC_CONFIG
    }

    fn id(&self) -> String {
        self.key.to_string()
    }

    async fn execute(&self) -> anyhow::Result<()> {
        let spec = load_workload(&self.ctx, &self.key).await?;
        let env = self.ctx.store.get_env(&self.key).await?;
        self.ctx.reconciler.sync_config(&spec, &env.config).await?;
        tracing::info!(workload = %self.key, keys = env.config.len(), "Config synced");
        Ok(())
    }
}

/// Project the persisted secret environment onto the secret store
pub struct SyncSecretJob {
    ctx: Arc<ControlContext>,
    key: WorkloadKey,
}

impl SyncSecretJob {
    pub fn new(ctx: Arc<ControlContext>, key: WorkloadKey) -> Self {
        Self { ctx, key }
    }
}

#[async_trait]
impl Job for SyncSecretJob {
    fn job_type(&self) -> &'static str {
        SYNC_SECRET
    }

    fn id(&self) -> String {
        self.key.to_string()
    }

    async fn execute(&self) -> anyhow::Result<()> {
        let spec = load_workload(&self.ctx, &self.key).await?;
        let env = self.ctx.store.get_env(&self.key).await?;
        self.ctx.reconciler.sync_secrets(&spec, &env.secrets).await?;
        tracing::info!(workload = %self.key, keys = env.secrets.len(), "Secrets synced");
        Ok(())
    }
}

/// Remove every cluster resource of a workload, then its record so the
/// periodic audit does not bring it back
pub struct DeleteWorkloadJob {
    ctx: Arc<ControlContext>,
    key: WorkloadKey,
}

impl DeleteWorkloadJob {
    pub fn new(ctx: Arc<ControlContext>, key: WorkloadKey) -> Self {
        Self { ctx, key }
    }
}

#[async_trait]
impl Job for DeleteWorkloadJob {
    fn job_type(&self) -> &'static str {
        DELETE_WORKLOAD
    }

    fn id(&self) -> String {
        self.key.to_string()
    }

    async fn execute(&self) -> anyhow::Result<()> {
        self.ctx.reconciler.delete_all(&self.key).await?;
        let existed = self.ctx.store.delete_workload(&self.key).await?;
        tracing::info!(workload = %self.key, existed, "Workload deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::testing::harness;
    use ferry_cluster::{Api, ConfigStore, Operation, ResourceKind, SecretStore};
    use ferry_types::{DeployVersion, WorkloadEnv, WorkloadPhase};
    use std::collections::BTreeMap;

    const NS: &str = "ferry-workloads";

    fn spec() -> WorkloadSpec {
        WorkloadSpec::new("abc123", "u1", "nginx:1.0", 8080).with_owner_secret("s3cret")
    }

    #[tokio::test]
    async fn test_deploy_applies_version() {
        let h = harness();
        let key = spec().key();
        h.store.upsert_workload(spec()).await.unwrap();
        h.store
            .upsert_version(DeployVersion::new(VersionId(7), &key, "nginx:2.0", 9090))
            .await
            .unwrap();

        let job = DeployWorkloadJob::new(h.ctx.clone(), key.clone(), Some(VersionId(7)));
        assert_eq!(job.id(), "w-abc123-u1@7");
        job.execute().await.unwrap();

        let stored = h.store.get_workload(&key).await.unwrap().unwrap();
        assert_eq!(stored.image, "nginx:2.0");
        assert_eq!(stored.port, 9090);
        let version = h.store.get_version(VersionId(7)).await.unwrap().unwrap();
        assert_eq!(version.status, VersionStatus::Success);
        let status = h.store.get_status(&key).await.unwrap().unwrap();
        assert_eq!(status.phase, WorkloadPhase::Running);
        assert_eq!(h.cluster.count(ResourceKind::Compute).await, 1);
    }

    #[tokio::test]
    async fn test_deploy_failure_marks_version() {
        let h = harness();
        let key = spec().key();
        h.store.upsert_workload(spec()).await.unwrap();
        h.store
            .upsert_version(DeployVersion::new(VersionId(1), &key, "nginx:2.0", 8080))
            .await
            .unwrap();
        h.cluster
            .fail_on(ResourceKind::Compute, Operation::Create, "quota exceeded")
            .await;

        let job = DeployWorkloadJob::new(h.ctx.clone(), key.clone(), Some(VersionId(1)));
        assert!(job.execute().await.is_err());

        let version = h.store.get_version(VersionId(1)).await.unwrap().unwrap();
        assert_eq!(version.status, VersionStatus::Error);
        assert!(version.message.unwrap().contains("quota exceeded"));
        let status = h.store.get_status(&key).await.unwrap().unwrap();
        assert_eq!(status.phase, WorkloadPhase::Failed);
    }

    #[tokio::test]
    async fn test_deploy_rejects_foreign_version() {
        let h = harness();
        h.store.upsert_workload(spec()).await.unwrap();
        let other = WorkloadKey::new("other", "u2");
        h.store
            .upsert_version(DeployVersion::new(VersionId(3), &other, "evil:1", 80))
            .await
            .unwrap();

        let job = DeployWorkloadJob::new(h.ctx.clone(), spec().key(), Some(VersionId(3)));
        assert!(job.execute().await.is_err());
        assert_eq!(h.cluster.mutation_count().await, 0);
    }

    #[tokio::test]
    async fn test_deploy_missing_workload() {
        let h = harness();
        let job = DeployWorkloadJob::new(h.ctx.clone(), spec().key(), None);
        assert_eq!(job.id(), "w-abc123-u1");
        assert!(job.execute().await.is_err());
    }

    #[tokio::test]
    async fn test_sync_config_and_secrets() {
        let h = harness();
        let key = spec().key();
        h.store.upsert_workload(spec()).await.unwrap();
        h.store
            .put_env(
                &key,
                WorkloadEnv {
                    config: BTreeMap::from([
                        ("LOG_LEVEL".to_string(), "debug".to_string()),
                        ("FERRY_OWNER_ID".to_string(), "spoofed".to_string()),
                    ]),
                    secrets: BTreeMap::from([("DB_PASSWORD".to_string(), "pw".to_string())]),
                },
            )
            .await
            .unwrap();

        SyncConfigJob::new(h.ctx.clone(), key.clone())
            .execute()
            .await
            .unwrap();
        SyncSecretJob::new(h.ctx.clone(), key.clone())
            .execute()
            .await
            .unwrap();

        let config = Api::<ConfigStore>::namespaced(h.cluster.as_ref(), NS)
            .get("w-abc123-u1-env")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(config.data.get("LOG_LEVEL").map(String::as_str), Some("debug"));
        assert!(!config.data.contains_key("FERRY_OWNER_ID"));

        let secret = Api::<SecretStore>::namespaced(h.cluster.as_ref(), NS)
            .get("w-abc123-u1-secret")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(secret.data["DB_PASSWORD"], "pw");
        assert_eq!(secret.data["FERRY_OWNER_ID"], "u1");
        assert_eq!(secret.data["FERRY_OWNER_SECRET"], "s3cret");
    }

    #[tokio::test]
    async fn test_delete_removes_resources_and_record() {
        let h = harness();
        let key = spec().key();
        h.store.upsert_workload(spec()).await.unwrap();
        DeployWorkloadJob::new(h.ctx.clone(), key.clone(), None)
            .execute()
            .await
            .unwrap();
        assert_eq!(h.cluster.count(ResourceKind::RoutingRule).await, 1);

        let job = DeleteWorkloadJob::new(h.ctx.clone(), key.clone());
        job.execute().await.unwrap();
        assert_eq!(h.cluster.count(ResourceKind::Compute).await, 0);
        assert_eq!(h.cluster.count(ResourceKind::ConfigStore).await, 0);
        assert!(h.store.get_workload(&key).await.unwrap().is_none());

        job.execute().await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_keeps_record_on_failure() {
        let h = harness();
        let key = spec().key();
        h.store.upsert_workload(spec()).await.unwrap();
        DeployWorkloadJob::new(h.ctx.clone(), key.clone(), None)
            .execute()
            .await
            .unwrap();
        h.cluster
            .fail_on(ResourceKind::Compute, Operation::Delete, "api down")
            .await;

        assert!(DeleteWorkloadJob::new(h.ctx.clone(), key.clone())
            .execute()
            .await
            .is_err());
        assert!(h.store.get_workload(&key).await.unwrap().is_some());
        assert_eq!(h.cluster.count(ResourceKind::RoutingRule).await, 0);
    }
}
