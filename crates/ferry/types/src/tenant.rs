//! Tenants and their data resources

use crate::{DataResourceId, OwnerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provisioning state shared by tenants and data resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionStatus {
    Pending,
    Active,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub owner_id: OwnerId,
    pub status: ProvisionStatus,
    #[serde(default)]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(owner_id: impl Into<OwnerId>) -> Self {
        Self {
            owner_id: owner_id.into(),
            status: ProvisionStatus::Pending,
            message: None,
            created_at: Utc::now(),
        }
    }
}

/// Kind of tenant data resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataResourceKind {
    /// A schema inside the tenant's relational database
    RelationalSchema,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataResource {
    pub resource_id: DataResourceId,
    pub owner_id: OwnerId,
    pub kind: DataResourceKind,
    pub status: ProvisionStatus,
    #[serde(default)]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DataResource {
    pub fn relational(resource_id: impl Into<DataResourceId>, owner_id: impl Into<OwnerId>) -> Self {
        Self {
            resource_id: resource_id.into(),
            owner_id: owner_id.into(),
            kind: DataResourceKind::RelationalSchema,
            status: ProvisionStatus::Pending,
            message: None,
            created_at: Utc::now(),
        }
    }
}

/// Make an identifier usable inside SQL object names
pub fn sanitize_identifier(raw: &str) -> String {
    raw.replace(['-', '.'], "_").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("Abc-12.x"), "abc_12_x");
    }

    #[test]
    fn test_new_records_are_pending() {
        assert_eq!(Tenant::new("u1").status, ProvisionStatus::Pending);
        let res = DataResource::relational("r1", "u1");
        assert_eq!(res.kind, DataResourceKind::RelationalSchema);
        assert_eq!(res.status, ProvisionStatus::Pending);
    }
}
