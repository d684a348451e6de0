//! Custom domains: claim service, DNS verification and provisioning

mod provisioner;
mod service;
mod verifier;

pub use provisioner::{DomainProvisioner, ProvisionStep, CUSTOM_DOMAIN_PORT};
pub use service::DomainService;
pub use verifier::{DomainVerifier, RunTicket, ScheduledRuns, VerificationSettings};
