use super::{ControlContext, AUDIT_WORKLOADS, DOMAIN_CHECK};
use crate::domain::ScheduledRuns;
use crate::store::{DomainStore, WorkloadStore};
use async_trait::async_trait;
use chrono::Utc;
use ferry_jobs::Job;
use ferry_types::DomainStatus;
use std::sync::Arc;
use std::time::Duration;

/// Re-reconcile every persisted workload and rewrite its phase
pub struct AuditWorkloadsJob {
    ctx: Arc<ControlContext>,
}

impl AuditWorkloadsJob {
    pub fn new(ctx: Arc<ControlContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Job for AuditWorkloadsJob {
    fn job_type(&self) -> &'static str {
        AUDIT_WORKLOADS
    }

    fn id(&self) -> String {
        AUDIT_WORKLOADS.to_string()
    }

    async fn execute(&self) -> anyhow::Result<()> {
        let store = self.ctx.store.as_ref();
        let workloads = store.list_workloads().await?;
        let total = workloads.len();

        let mut failed = 0usize;
        for spec in &workloads {
            // failures are already logged and written to the phase
            if self.ctx.reconciler.reconcile_and_report(spec, store).await.is_err() {
                failed += 1;
            }
        }

        tracing::info!(total, failed, "Workload audit finished");
        if failed > 0 {
            anyhow::bail!("{failed} of {total} workloads failed to reconcile");
        }
        Ok(())
    }
}

/// Fail claims that stayed `pending` past `stale_after` with no verification
/// run left to resolve them, e.g. after a restart interrupted the run.
///
/// Claims whose run is still queued or executing are skipped no matter how
/// old they are.
pub struct DomainCheckJob {
    ctx: Arc<ControlContext>,
    runs: ScheduledRuns,
    stale_after: Duration,
}

impl DomainCheckJob {
    pub fn new(ctx: Arc<ControlContext>, runs: ScheduledRuns, stale_after: Duration) -> Self {
        Self {
            ctx,
            runs,
            stale_after,
        }
    }
}

#[async_trait]
impl Job for DomainCheckJob {
    fn job_type(&self) -> &'static str {
        DOMAIN_CHECK
    }

    fn id(&self) -> String {
        DOMAIN_CHECK.to_string()
    }

    async fn execute(&self) -> anyhow::Result<()> {
        let store = self.ctx.store.as_ref();
        let cutoff = Utc::now() - chrono::Duration::from_std(self.stale_after)?;

        let mut expired = 0usize;
        for claim in store.list_claims().await? {
            if claim.status != DomainStatus::Pending || claim.created_at > cutoff {
                continue;
            }
            if self.runs.contains(&claim.claim_id) {
                tracing::debug!(claim_id = %claim.claim_id, "Pending claim still has a verification run");
                continue;
            }
            if store
                .transition_claim(&claim.claim_id, DomainStatus::Pending, DomainStatus::Error)
                .await?
            {
                tracing::warn!(claim_id = %claim.claim_id, domain = %claim.domain, "Stale pending claim marked as error");
                expired += 1;
            }
        }

        tracing::debug!(expired, "Domain check finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::StaticResolver;
    use crate::domain::{DomainProvisioner, DomainVerifier, VerificationSettings};
    use crate::jobs::testing::{harness, Harness};
    use crate::jobs::VerifyDomainJob;
    use crate::settings::PlatformSettings;
    use ferry_cluster::{Operation, ResourceKind};
    use ferry_jobs::{Processor, ProcessorConfig};
    use ferry_types::{CustomDomain, WorkloadPhase, WorkloadSpec};

    #[tokio::test]
    async fn test_audit_reconciles_every_workload() {
        let h = harness();
        for id in ["a1", "b2"] {
            h.store
                .upsert_workload(WorkloadSpec::new(id, "u1", "nginx:latest", 8080))
                .await
                .unwrap();
        }

        AuditWorkloadsJob::new(h.ctx.clone()).execute().await.unwrap();
        assert_eq!(h.cluster.count(ResourceKind::Compute).await, 2);

        // nothing drifted, so the second pass writes nothing
        let before = h.cluster.mutation_count().await;
        AuditWorkloadsJob::new(h.ctx.clone()).execute().await.unwrap();
        assert_eq!(h.cluster.mutation_count().await, before);
    }

    #[tokio::test]
    async fn test_audit_reports_failures() {
        let h = harness();
        let spec = WorkloadSpec::new("a1", "u1", "nginx:latest", 8080);
        let key = spec.key();
        h.store.upsert_workload(spec).await.unwrap();
        h.cluster
            .fail_on(ResourceKind::RoutingRule, Operation::Create, "ingress offline")
            .await;

        let err = AuditWorkloadsJob::new(h.ctx.clone()).execute().await.unwrap_err();
        assert_eq!(err.to_string(), "1 of 1 workloads failed to reconcile");
        let status = h.store.get_status(&key).await.unwrap().unwrap();
        assert_eq!(status.phase, WorkloadPhase::Failed);

        h.cluster.clear_failures().await;
        AuditWorkloadsJob::new(h.ctx.clone()).execute().await.unwrap();
        let status = h.store.get_status(&key).await.unwrap().unwrap();
        assert_eq!(status.phase, WorkloadPhase::Running);
    }

    #[tokio::test]
    async fn test_domain_check_expires_stale_claims() {
        let h = harness();
        let mut stale = CustomDomain::new("u1", "old.example.com", "app.example.net");
        stale.created_at = Utc::now() - chrono::Duration::minutes(10);
        let fresh = CustomDomain::new("u1", "new.example.com", "app.example.net");
        let mut verified = CustomDomain::new("u1", "done.example.com", "app.example.net");
        verified.created_at = stale.created_at;
        for claim in [&stale, &fresh, &verified] {
            h.store.insert_claim(claim.clone()).await.unwrap();
        }
        h.store
            .transition_claim(&verified.claim_id, DomainStatus::Pending, DomainStatus::Success)
            .await
            .unwrap();

        DomainCheckJob::new(h.ctx.clone(), ScheduledRuns::new(), Duration::from_secs(300))
            .execute()
            .await
            .unwrap();

        for (claim, expected) in [
            (&stale, DomainStatus::Error),
            (&fresh, DomainStatus::Pending),
            (&verified, DomainStatus::Success),
        ] {
            let stored = h.store.get_claim(&claim.claim_id).await.unwrap().unwrap();
            assert_eq!(stored.status, expected, "{}", claim.domain);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_domain_check_skips_queued_claims() {
        let h = harness();
        let dns = Arc::new(StaticResolver::new());
        let provisioner = Arc::new(DomainProvisioner::new(
            h.cluster.clone(),
            PlatformSettings::default(),
        ));
        let verifier = Arc::new(DomainVerifier::new(
            h.store.clone(),
            dns.clone(),
            provisioner,
            VerificationSettings::default(),
        ));
        let processor = Processor::new(
            "verification",
            ProcessorConfig {
                workers: 1,
                queue_capacity: 4,
            },
        );
        processor.start().await;

        // never resolves, so it holds the only worker for the full minute
        let blocking = CustomDomain::new("u1", "slow.example.com", "app.svc.example.net");
        h.store.insert_claim(blocking.clone()).await.unwrap();
        processor
            .submit(Box::new(VerifyDomainJob::new(verifier.clone(), blocking.claim_id.clone())))
            .await
            .unwrap();

        let mut queued = CustomDomain::new("u1", "example.com", "app.svc.example.net");
        queued.created_at = Utc::now() - chrono::Duration::seconds(301);
        h.store.insert_claim(queued.clone()).await.unwrap();
        dns.set_txt(&queued.txt_name, vec![queued.txt_value.clone()]).await;
        dns.set_cname("example.com", "app.svc.example.net.").await;
        processor
            .submit(Box::new(VerifyDomainJob::new(verifier.clone(), queued.claim_id.clone())))
            .await
            .unwrap();

        DomainCheckJob::new(h.ctx.clone(), verifier.runs().clone(), Duration::from_secs(300))
            .execute()
            .await
            .unwrap();
        let stored = h.store.get_claim(&queued.claim_id).await.unwrap().unwrap();
        assert_eq!(stored.status, DomainStatus::Pending);

        processor.close().await;
        let stored = h.store.get_claim(&queued.claim_id).await.unwrap().unwrap();
        assert_eq!(stored.status, DomainStatus::Success);
        assert_eq!(h.cluster.count(ResourceKind::RoutingRule).await, 1);
        assert!(verifier.runs().is_empty());
    }

    #[tokio::test]
    async fn test_domain_check_expires_orphaned_claims() {
        let h = harness();
        let runs = ScheduledRuns::new();
        let mut orphaned = CustomDomain::new("u1", "old.example.com", "app.example.net");
        orphaned.created_at = Utc::now() - chrono::Duration::minutes(10);
        let mut tracked = CustomDomain::new("u1", "busy.example.com", "app.example.net");
        tracked.created_at = orphaned.created_at;
        for claim in [&orphaned, &tracked] {
            h.store.insert_claim(claim.clone()).await.unwrap();
        }
        let ticket = runs.enter(tracked.claim_id.clone());

        let job = DomainCheckJob::new(h.ctx.clone(), runs.clone(), Duration::from_secs(300));
        job.execute().await.unwrap();
        assert_eq!(claim_status(&h, &orphaned).await, DomainStatus::Error);
        assert_eq!(claim_status(&h, &tracked).await, DomainStatus::Pending);

        // once its run is gone the claim is treated like any other
        drop(ticket);
        job.execute().await.unwrap();
        assert_eq!(claim_status(&h, &tracked).await, DomainStatus::Error);
    }

    async fn claim_status(h: &Harness, claim: &CustomDomain) -> DomainStatus {
        h.store.get_claim(&claim.claim_id).await.unwrap().unwrap().status
    }
}
