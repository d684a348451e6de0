//! Request-layer entry point: build a job from a task type and a JSON
//! payload of identifiers, then hand it to the task processor

use crate::error::TaskError;
use crate::jobs::{
    self, ControlContext, CreateDataResourceJob, DeleteDataResourceJob, DeleteWorkloadJob,
    DeployWorkloadJob, RegisterTenantJob, SyncConfigJob, SyncSecretJob,
};
use crate::store::{AuditStore, Store};
use async_trait::async_trait;
use ferry_jobs::{BoxedJob, JobListener, JobRecord, Processor};
use ferry_types::{DataResourceId, OwnerId, VersionId, WorkloadId, WorkloadKey};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

/// Task types accepted by [`TaskFactory::build`]
pub const TASK_TYPES: &[&str] = &[
    jobs::DEPLOY_WORKLOAD,
    jobs::SYNC_CONFIG,
    jobs::SYNC_SECRET,
    jobs::DELETE_WORKLOAD,
    jobs::REGISTER_TENANT,
    jobs::CREATE_DATA_RESOURCE,
    jobs::DELETE_DATA_RESOURCE,
];

#[derive(Debug, Deserialize)]
struct WorkloadPayload {
    workload_id: WorkloadId,
    owner_id: OwnerId,
    #[serde(default)]
    version_id: Option<VersionId>,
}

impl WorkloadPayload {
    fn key(&self) -> WorkloadKey {
        WorkloadKey::new(self.workload_id.clone(), self.owner_id.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TenantPayload {
    owner_id: OwnerId,
}

#[derive(Debug, Deserialize)]
struct DataResourcePayload {
    owner_id: OwnerId,
    resource_id: DataResourceId,
}

pub struct TaskFactory {
    ctx: Arc<ControlContext>,
    processor: Arc<Processor>,
}

impl TaskFactory {
    pub fn new(ctx: Arc<ControlContext>, processor: Arc<Processor>) -> Self {
        Self { ctx, processor }
    }

    /// Build the job for `task_type` without submitting it
    pub fn build(&self, task_type: &str, payload: serde_json::Value) -> Result<BoxedJob, TaskError> {
        let ctx = self.ctx.clone();
        let job: BoxedJob = match task_type {
            jobs::DEPLOY_WORKLOAD => {
                let p: WorkloadPayload = parse(task_type, payload)?;
                Box::new(DeployWorkloadJob::new(ctx, p.key(), p.version_id))
            }
            jobs::SYNC_CONFIG => {
                let p: WorkloadPayload = parse(task_type, payload)?;
                Box::new(SyncConfigJob::new(ctx, p.key()))
            }
            jobs::SYNC_SECRET => {
                let p: WorkloadPayload = parse(task_type, payload)?;
                Box::new(SyncSecretJob::new(ctx, p.key()))
            }
            jobs::DELETE_WORKLOAD => {
                let p: WorkloadPayload = parse(task_type, payload)?;
                Box::new(DeleteWorkloadJob::new(ctx, p.key()))
            }
            jobs::REGISTER_TENANT => {
                let p: TenantPayload = parse(task_type, payload)?;
                Box::new(RegisterTenantJob::new(ctx, p.owner_id))
            }
            jobs::CREATE_DATA_RESOURCE => {
                let p: DataResourcePayload = parse(task_type, payload)?;
                Box::new(CreateDataResourceJob::new(ctx, p.owner_id, p.resource_id))
            }
            jobs::DELETE_DATA_RESOURCE => {
                let p: DataResourcePayload = parse(task_type, payload)?;
                Box::new(DeleteDataResourceJob::new(ctx, p.owner_id, p.resource_id))
            }
            other => return Err(TaskError::UnknownType(other.to_string())),
        };
        Ok(job)
    }

    /// Build and enqueue a task. Waits while the processor queue is full.
    /// Returns the job's correlation id.
    pub async fn submit_task(
        &self,
        task_type: &str,
        payload: serde_json::Value,
    ) -> Result<String, TaskError> {
        let job = self.build(task_type, payload)?;
        let job_id = job.id();
        self.processor.submit(job).await?;
        tracing::debug!(task_type, job_id = %job_id, "Task submitted");
        Ok(job_id)
    }
}

fn parse<T: DeserializeOwned>(task_type: &str, payload: serde_json::Value) -> Result<T, TaskError> {
    serde_json::from_value(payload).map_err(|e| TaskError::InvalidPayload {
        task_type: task_type.to_string(),
        message: e.to_string(),
    })
}

/// Writes the audit record of every finished job to the store
pub struct AuditListener {
    store: Arc<dyn Store>,
}

impl AuditListener {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl JobListener for AuditListener {
    async fn on_finished(&self, record: &JobRecord) {
        if let Err(e) = self.store.record_job(record.clone()).await {
            tracing::warn!(
                job_type = %record.job_type,
                job_id = %record.job_id,
                error = %e,
                "Failed to write job audit record"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::testing::harness;
    use crate::store::{InMemoryStore, WorkloadStore};
    use ferry_jobs::{JobOutcome, ProcessorConfig};
    use ferry_types::{WorkloadPhase, WorkloadSpec};
    use serde_json::json;

    fn processor(store: Arc<InMemoryStore>) -> Arc<Processor> {
        Arc::new(
            Processor::new(
                "tasks",
                ProcessorConfig {
                    workers: 2,
                    queue_capacity: 8,
                },
            )
            .with_listener(Arc::new(AuditListener::new(store))),
        )
    }

    #[tokio::test]
    async fn test_build_every_task_type() {
        let h = harness();
        let factory = TaskFactory::new(h.ctx.clone(), processor(h.store.clone()));
        let payloads = [
            json!({"workload_id": "abc123", "owner_id": "u1", "version_id": 4}),
            json!({"workload_id": "abc123", "owner_id": "u1"}),
            json!({"workload_id": "abc123", "owner_id": "u1"}),
            json!({"workload_id": "abc123", "owner_id": "u1"}),
            json!({"owner_id": "u1"}),
            json!({"owner_id": "u1", "resource_id": "orders"}),
            json!({"owner_id": "u1", "resource_id": "orders"}),
        ];

        for (task_type, payload) in TASK_TYPES.iter().zip(payloads) {
            let job = factory.build(task_type, payload).unwrap();
            assert_eq!(job.job_type(), *task_type);
        }
        let deploy = factory
            .build(jobs::DEPLOY_WORKLOAD, json!({"workload_id": "abc123", "owner_id": "u1", "version_id": 4}))
            .unwrap();
        assert_eq!(deploy.id(), "w-abc123-u1@4");
    }

    #[tokio::test]
    async fn test_build_rejects_bad_input() {
        let h = harness();
        let factory = TaskFactory::new(h.ctx.clone(), processor(h.store.clone()));

        assert!(matches!(
            factory.build("workload.explode", json!({})),
            Err(TaskError::UnknownType(t)) if t == "workload.explode"
        ));
        assert!(matches!(
            factory.build(jobs::REGISTER_TENANT, json!({"owner": "u1"})),
            Err(TaskError::InvalidPayload { task_type, .. }) if task_type == "tenant.register"
        ));
        assert!(matches!(
            factory.build(jobs::DEPLOY_WORKLOAD, json!({"workload_id": "a", "owner_id": "u1", "version_id": "x"})),
            Err(TaskError::InvalidPayload { .. })
        ));
    }

    #[tokio::test]
    async fn test_submit_runs_and_audits() {
        let h = harness();
        let processor = processor(h.store.clone());
        processor.start().await;
        let factory = TaskFactory::new(h.ctx.clone(), processor.clone());
        let spec = WorkloadSpec::new("abc123", "u1", "nginx:latest", 8080);
        h.store.upsert_workload(spec.clone()).await.unwrap();

        let job_id = factory
            .submit_task(jobs::DEPLOY_WORKLOAD, json!({"workload_id": "abc123", "owner_id": "u1"}))
            .await
            .unwrap();
        assert_eq!(job_id, "w-abc123-u1");
        factory
            .submit_task(jobs::SYNC_CONFIG, json!({"workload_id": "missing", "owner_id": "u1"}))
            .await
            .unwrap();
        processor.close().await;

        let status = h.store.get_status(&spec.key()).await.unwrap().unwrap();
        assert_eq!(status.phase, WorkloadPhase::Running);

        let records = h.store.recent_jobs(10).await.unwrap();
        assert_eq!(records.len(), 2);
        let deploy = records
            .iter()
            .find(|r| r.job_type == jobs::DEPLOY_WORKLOAD)
            .unwrap();
        assert_eq!(deploy.outcome, JobOutcome::Succeeded);
        let sync = records.iter().find(|r| r.job_type == jobs::SYNC_CONFIG).unwrap();
        assert!(matches!(&sync.outcome, JobOutcome::Failed(m) if m.contains("not found")));
    }

    #[tokio::test]
    async fn test_submit_after_close() {
        let h = harness();
        let processor = processor(h.store.clone());
        processor.start().await;
        processor.close().await;
        let factory = TaskFactory::new(h.ctx.clone(), processor);

        let result = factory
            .submit_task(jobs::REGISTER_TENANT, json!({"owner_id": "u1"}))
            .await;
        assert!(matches!(result, Err(TaskError::Submit(_))));
    }
}
