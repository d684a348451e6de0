//! Bounded-retry DNS verification of custom-domain claims
//!
//! One run per claim: wait an interval, check TXT and CNAME, repeat up to
//! `max_attempts` times. A claim leaves `pending` exactly once.

use super::provisioner::DomainProvisioner;
use crate::dns::DnsResolver;
use crate::store::{DomainStore, Store};
use ferry_types::{ClaimId, CustomDomain, DomainStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    pub interval_secs: u64,
    pub max_attempts: u32,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            max_attempts: 12,
        }
    }
}

impl VerificationSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Longest a single run can take once it starts
    pub fn run_duration(&self) -> Duration {
        self.interval() * self.max_attempts
    }
}

/// Claims with a verification run queued or executing in this process
#[derive(Debug, Clone, Default)]
pub struct ScheduledRuns {
    claims: Arc<Mutex<HashMap<ClaimId, usize>>>,
}

impl ScheduledRuns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, claim_id: &ClaimId) -> bool {
        self.lock().contains_key(claim_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Track `claim_id` until the returned ticket is dropped
    pub fn enter(&self, claim_id: ClaimId) -> RunTicket {
        *self.lock().entry(claim_id.clone()).or_insert(0) += 1;
        RunTicket {
            runs: self.clone(),
            claim_id,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ClaimId, usize>> {
        // the map stays consistent even if a holder panicked
        self.claims.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Keeps a claim in [`ScheduledRuns`] while alive
#[derive(Debug)]
pub struct RunTicket {
    runs: ScheduledRuns,
    claim_id: ClaimId,
}

impl Drop for RunTicket {
    fn drop(&mut self) {
        let mut claims = self.runs.lock();
        if let Some(count) = claims.get_mut(&self.claim_id) {
            *count -= 1;
            if *count == 0 {
                claims.remove(&self.claim_id);
            }
        }
    }
}

pub struct DomainVerifier {
    store: Arc<dyn Store>,
    dns: Arc<dyn DnsResolver>,
    provisioner: Arc<DomainProvisioner>,
    settings: VerificationSettings,
    runs: ScheduledRuns,
}

impl DomainVerifier {
    pub fn new(
        store: Arc<dyn Store>,
        dns: Arc<dyn DnsResolver>,
        provisioner: Arc<DomainProvisioner>,
        settings: VerificationSettings,
    ) -> Self {
        Self {
            store,
            dns,
            provisioner,
            settings,
            runs: ScheduledRuns::new(),
        }
    }

    pub fn settings(&self) -> &VerificationSettings {
        &self.settings
    }

    /// Runs scheduled through [`crate::jobs::VerifyDomainJob`]
    pub fn runs(&self) -> &ScheduledRuns {
        &self.runs
    }

    /// Verify one claim and return its final status.
    ///
    /// Claims that are missing or no longer pending are left alone.
    pub async fn run(&self, claim_id: &ClaimId) -> anyhow::Result<DomainStatus> {
        let claim = match self.store.get_claim(claim_id).await? {
            Some(claim) => claim,
            None => {
                tracing::warn!(claim_id = %claim_id, "Claim vanished before verification");
                anyhow::bail!("claim {claim_id} not found");
            }
        };
        if claim.status != DomainStatus::Pending {
            tracing::debug!(claim_id = %claim_id, status = %claim.status, "Claim already resolved");
            return Ok(claim.status);
        }

        for attempt in 1..=self.settings.max_attempts {
            tokio::time::sleep(self.settings.interval()).await;

            if self.check(&claim, attempt).await {
                return self.succeed(&claim).await;
            }
        }

        tracing::info!(
            claim_id = %claim_id,
            domain = %claim.domain,
            attempts = self.settings.max_attempts,
            "Verification budget exhausted"
        );
        self.store
            .transition_claim(claim_id, DomainStatus::Pending, DomainStatus::Error)
            .await?;
        Ok(DomainStatus::Error)
    }

    /// One attempt. Lookup errors count as a mismatch.
    async fn check(&self, claim: &CustomDomain, attempt: u32) -> bool {
        let txt = match self.dns.lookup_txt(&claim.txt_name).await {
            Ok(records) => claim.txt_matches(&records),
            Err(e) => {
                tracing::debug!(claim_id = %claim.claim_id, attempt, error = %e, "TXT lookup failed");
                false
            }
        };
        let cname = match self.dns.lookup_cname(&claim.domain).await {
            Ok(records) => claim.cname_matches(&records),
            Err(e) => {
                tracing::debug!(claim_id = %claim.claim_id, attempt, error = %e, "CNAME lookup failed");
                false
            }
        };

        tracing::debug!(claim_id = %claim.claim_id, attempt, txt, cname, "Verification attempt");
        txt && cname
    }

    async fn succeed(&self, claim: &CustomDomain) -> anyhow::Result<DomainStatus> {
        let claim_id = &claim.claim_id;
        if !self
            .store
            .transition_claim(claim_id, DomainStatus::Pending, DomainStatus::Success)
            .await?
        {
            tracing::warn!(claim_id = %claim_id, "Claim left pending during verification; not provisioning");
            let current = self.store.get_claim(claim_id).await?;
            return Ok(current.map_or(DomainStatus::Error, |c| c.status));
        }
        tracing::info!(claim_id = %claim_id, domain = %claim.domain, "Domain verified");

        if let Err(e) = self.provisioner.provision(claim).await {
            tracing::error!(claim_id = %claim_id, step = %e.step, error = %e.source, "Provisioning failed");
            self.store
                .transition_claim(claim_id, DomainStatus::Success, DomainStatus::Error)
                .await?;
            return Err(e.into());
        }

        Ok(DomainStatus::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::StaticResolver;
    use crate::settings::PlatformSettings;
    use crate::store::InMemoryStore;
    use ferry_cluster::{InMemoryCluster, Operation, ResourceKind};
    use tokio::time::Instant;

    struct Fixture {
        store: Arc<InMemoryStore>,
        dns: Arc<StaticResolver>,
        cluster: Arc<InMemoryCluster>,
        verifier: DomainVerifier,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let dns = Arc::new(StaticResolver::new());
        let cluster = Arc::new(InMemoryCluster::new());
        let provisioner = Arc::new(DomainProvisioner::new(
            cluster.clone(),
            PlatformSettings::default(),
        ));
        let verifier = DomainVerifier::new(
            store.clone(),
            dns.clone(),
            provisioner,
            VerificationSettings::default(),
        );
        Fixture {
            store,
            dns,
            cluster,
            verifier,
        }
    }

    async fn pending_claim(store: &InMemoryStore) -> CustomDomain {
        let claim = CustomDomain::new("u1", "example.com", "app.svc.example.net");
        store.insert_claim(claim.clone()).await.unwrap();
        claim
    }

    async fn publish(dns: &StaticResolver, claim: &CustomDomain) {
        dns.set_txt(&claim.txt_name, vec![claim.txt_value.clone()]).await;
        dns.set_cname(&claim.domain, "app.svc.example.net.").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_verified_on_first_attempt() {
        let f = fixture();
        let claim = pending_claim(&f.store).await;
        assert_eq!(claim.txt_name, "_verify.example.com");
        publish(&f.dns, &claim).await;

        let start = Instant::now();
        let status = f.verifier.run(&claim.claim_id).await.unwrap();

        assert_eq!(status, DomainStatus::Success);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert_eq!(f.dns.txt_lookups(), 1);
        assert_eq!(
            f.store.get_claim(&claim.claim_id).await.unwrap().unwrap().status,
            DomainStatus::Success
        );
        assert_eq!(f.cluster.count(ResourceKind::RoutingRule).await, 1);
        assert_eq!(f.cluster.mutation_count().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_verified_on_later_attempt() {
        let f = Arc::new(fixture());
        let claim = pending_claim(&f.store).await;

        let run = {
            let f = f.clone();
            let id = claim.claim_id.clone();
            tokio::spawn(async move { f.verifier.run(&id).await.unwrap() })
        };

        // records appear between the third and fourth attempt
        tokio::time::sleep(Duration::from_secs(17)).await;
        publish(&f.dns, &claim).await;

        assert_eq!(run.await.unwrap(), DomainStatus::Success);
        assert_eq!(f.dns.txt_lookups(), 4);
        assert_eq!(f.cluster.mutation_count().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_marks_error() {
        let f = fixture();
        let claim = pending_claim(&f.store).await;
        f.dns
            .set_txt(&claim.txt_name, vec!["ferry-verify=wrong".into()])
            .await;
        f.dns.set_cname(&claim.domain, "app.svc.example.net").await;

        let start = Instant::now();
        let status = f.verifier.run(&claim.claim_id).await.unwrap();

        assert_eq!(status, DomainStatus::Error);
        assert_eq!(start.elapsed(), Duration::from_secs(60));
        assert_eq!(f.dns.txt_lookups(), 12);
        assert_eq!(f.dns.cname_lookups(), 12);
        assert_eq!(f.cluster.mutation_count().await, 0);
        assert_eq!(
            f.store.get_claim(&claim.claim_id).await.unwrap().unwrap().status,
            DomainStatus::Error
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_nxdomain_consumes_attempts() {
        let f = fixture();
        let claim = pending_claim(&f.store).await;

        let status = f.verifier.run(&claim.claim_id).await.unwrap();
        assert_eq!(status, DomainStatus::Error);
        assert_eq!(f.dns.txt_lookups(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cname_mismatch_is_negative() {
        let f = fixture();
        let claim = pending_claim(&f.store).await;
        f.dns.set_txt(&claim.txt_name, vec![claim.txt_value.clone()]).await;
        f.dns.set_cname(&claim.domain, "elsewhere.example.net.").await;

        let status = f.verifier.run(&claim.claim_id).await.unwrap();
        assert_eq!(status, DomainStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provisioning_failure_marks_error() {
        let f = fixture();
        let claim = pending_claim(&f.store).await;
        publish(&f.dns, &claim).await;
        f.cluster
            .fail_on(ResourceKind::RoutingRule, Operation::Create, "ingress offline")
            .await;

        assert!(f.verifier.run(&claim.claim_id).await.is_err());
        assert_eq!(
            f.store.get_claim(&claim.claim_id).await.unwrap().unwrap().status,
            DomainStatus::Error
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolved_claim_is_left_alone() {
        let f = fixture();
        let claim = pending_claim(&f.store).await;
        f.store
            .transition_claim(&claim.claim_id, DomainStatus::Pending, DomainStatus::Error)
            .await
            .unwrap();

        let status = f.verifier.run(&claim.claim_id).await.unwrap();
        assert_eq!(status, DomainStatus::Error);
        assert_eq!(f.dns.txt_lookups(), 0);
    }

    #[test]
    fn test_scheduled_runs_track_tickets() {
        let runs = ScheduledRuns::new();
        let id = ClaimId::new("c1");

        let first = runs.enter(id.clone());
        let second = runs.enter(id.clone());
        assert!(runs.contains(&id));
        assert_eq!(runs.len(), 1);

        drop(first);
        assert!(runs.contains(&id));
        drop(second);
        assert!(!runs.contains(&id));
        assert!(runs.is_empty());
    }

    #[test]
    fn test_run_duration() {
        assert_eq!(VerificationSettings::default().run_duration(), Duration::from_secs(60));
    }
}
