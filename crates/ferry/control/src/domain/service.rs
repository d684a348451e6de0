//! Custom-domain claims as seen by the request layer

use super::provisioner::DomainProvisioner;
use super::verifier::DomainVerifier;
use crate::error::DomainError;
use crate::jobs::VerifyDomainJob;
use crate::store::{DomainStore, Store};
use ferry_jobs::Processor;
use ferry_types::{normalize_fqdn, ClaimId, CustomDomain, DomainStatus, OwnerId};
use std::sync::Arc;

pub struct DomainService {
    store: Arc<dyn Store>,
    verifier: Arc<DomainVerifier>,
    provisioner: Arc<DomainProvisioner>,
    verification: Arc<Processor>,
}

impl DomainService {
    /// `verification` is the dedicated processor verification runs execute on
    pub fn new(
        store: Arc<dyn Store>,
        verifier: Arc<DomainVerifier>,
        provisioner: Arc<DomainProvisioner>,
        verification: Arc<Processor>,
    ) -> Self {
        Self {
            store,
            verifier,
            provisioner,
            verification,
        }
    }

    /// Persist a pending claim and schedule its single verification run.
    ///
    /// If the run cannot be scheduled the claim is moved to `error` before
    /// the scheduling error is returned.
    pub async fn create_claim(
        &self,
        owner: impl Into<OwnerId>,
        domain: &str,
        target: &str,
    ) -> Result<CustomDomain, DomainError> {
        validate_host("domain", domain)?;
        validate_host("target", target)?;

        let claim = CustomDomain::new(owner, domain, target);
        self.store.insert_claim(claim.clone()).await?;
        tracing::info!(
            claim_id = %claim.claim_id,
            domain = %claim.domain,
            target = %claim.target,
            "Custom domain claim created"
        );

        let job = VerifyDomainJob::new(self.verifier.clone(), claim.claim_id.clone());
        if let Err(e) = self.verification.submit(Box::new(job)).await {
            tracing::error!(claim_id = %claim.claim_id, error = %e, "Verification run not scheduled");
            self.store
                .transition_claim(&claim.claim_id, DomainStatus::Pending, DomainStatus::Error)
                .await?;
            return Err(e.into());
        }
        Ok(claim)
    }

    /// Remove the claim record, then best-effort remove whatever was
    /// provisioned for it. Returns whether a record existed.
    pub async fn delete_claim(&self, claim_id: &ClaimId) -> Result<bool, DomainError> {
        let existed = self.store.delete_claim(claim_id).await?;

        if let Err(e) = self.provisioner.deprovision(claim_id).await {
            tracing::warn!(claim_id = %claim_id, error = %e, "Leaving custom domain resources behind");
        }

        tracing::info!(claim_id = %claim_id, existed, "Custom domain claim deleted");
        Ok(existed)
    }

    pub async fn get_claim(&self, claim_id: &ClaimId) -> Result<CustomDomain, DomainError> {
        self.store
            .get_claim(claim_id)
            .await?
            .ok_or_else(|| DomainError::ClaimNotFound(claim_id.to_string()))
    }
}

fn validate_host(field: &str, value: &str) -> Result<(), DomainError> {
    let host = normalize_fqdn(value.trim());
    if host.is_empty() {
        return Err(DomainError::InvalidClaim(format!("{field} is empty")));
    }
    if host.split('.').count() < 2 || host.split('.').any(str::is_empty) {
        return Err(DomainError::InvalidClaim(format!("{field} {value:?} is not a domain name")));
    }
    Ok(())
}
