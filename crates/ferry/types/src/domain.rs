//! Custom-domain claims
//!
//! A claim asks the platform to serve `domain` for a routing `target`. The
//! owner proves control by publishing a TXT record and pointing a CNAME at the
//! target; see the verification machine in `ferry-control`.

use crate::ids::random_hex;
use crate::{ClaimId, OwnerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Leading label of the verification TXT record name
pub const TXT_RECORD_PREFIX: &str = "_verify";
/// Prefix of the verification TXT record value
pub const TXT_VALUE_PREFIX: &str = "ferry-verify=";

/// Claim status. `Success` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainStatus {
    Pending,
    Success,
    Error,
}

impl DomainStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DomainStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DomainStatus::Pending => "pending",
            DomainStatus::Success => "success",
            DomainStatus::Error => "error",
        }
    }
}

impl fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A custom-domain claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomDomain {
    pub claim_id: ClaimId,
    pub domain: String,
    pub target: String,
    pub txt_name: String,
    pub txt_value: String,
    pub status: DomainStatus,
    pub owner_id: OwnerId,
    pub created_at: DateTime<Utc>,
}

impl CustomDomain {
    /// Build a new pending claim with a fresh claim id and verification token
    pub fn new(owner_id: impl Into<OwnerId>, domain: &str, target: &str) -> Self {
        let domain = normalize_fqdn(domain).to_ascii_lowercase();
        Self {
            claim_id: ClaimId::generate(),
            txt_name: format!("{}.{}", TXT_RECORD_PREFIX, domain),
            txt_value: format!("{}{}", TXT_VALUE_PREFIX, random_hex(16)),
            domain,
            target: target.to_string(),
            status: DomainStatus::Pending,
            owner_id: owner_id.into(),
            created_at: Utc::now(),
        }
    }

    /// Name shared by the external-name service, certificate and routing rule
    pub fn resource_name(&self) -> String {
        claim_resource_name(&self.claim_id)
    }

    /// Secret the issued certificate is written to
    pub fn tls_secret_name(&self) -> String {
        format!("custom-domain-tls-{}", self.claim_id)
    }

    /// True if `records` contains the expected verification value
    pub fn txt_matches(&self, records: &[String]) -> bool {
        records.iter().any(|r| r == &self.txt_value)
    }

    /// True if any CNAME in `records` names the claimed target
    pub fn cname_matches(&self, records: &[String]) -> bool {
        let target = normalize_fqdn(&self.target);
        records
            .iter()
            .any(|r| normalize_fqdn(r).eq_ignore_ascii_case(target))
    }
}

/// Name of every sub-resource provisioned for a claim
pub fn claim_resource_name(claim_id: &ClaimId) -> String {
    format!("custom-domain-{}", claim_id)
}

/// Strip the trailing root dot of a fully qualified name
pub fn normalize_fqdn(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}
