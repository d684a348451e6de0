use super::VERIFY_DOMAIN;
use crate::domain::{DomainVerifier, RunTicket};
use async_trait::async_trait;
use ferry_jobs::Job;
use ferry_types::ClaimId;
use std::sync::Arc;

/// One verification run for a freshly created claim.
///
/// The claim counts as scheduled from construction until the job is
/// dropped, whether it is still queued, running or was never accepted.
pub struct VerifyDomainJob {
    verifier: Arc<DomainVerifier>,
    claim_id: ClaimId,
    _ticket: RunTicket,
}

impl VerifyDomainJob {
    pub fn new(verifier: Arc<DomainVerifier>, claim_id: ClaimId) -> Self {
        let ticket = verifier.runs().enter(claim_id.clone());
        Self {
            verifier,
            claim_id,
            _ticket: ticket,
        }
    }
}

#[async_trait]
impl Job for VerifyDomainJob {
    fn job_type(&self) -> &'static str {
        VERIFY_DOMAIN
    }

    fn id(&self) -> String {
        self.claim_id.to_string()
    }

    async fn execute(&self) -> anyhow::Result<()> {
        let status = self.verifier.run(&self.claim_id).await?;
        tracing::info!(claim_id = %self.claim_id, %status, "Verification run finished");
        Ok(())
    }
}
