//! Strongly-typed identifiers for Ferry entities
//!
//! Identifiers are issued by the request layer (workloads, owners, data
//! resources, versions) or generated here (claims). They are wrapped in
//! newtypes so a workload id can never be passed where an owner id is due.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a workload, unique per owner
    WorkloadId
);

string_id!(
    /// Identifier of a tenant (the owner of workloads, claims and data resources)
    OwnerId
);

string_id!(
    /// Short, caller-facing identifier of a custom-domain claim
    ClaimId
);

string_id!(
    /// Identifier of a tenant data resource (a relational schema)
    DataResourceId
);

impl ClaimId {
    /// Generate a fresh 8-character hex claim id
    pub fn generate() -> Self {
        Self(random_hex(4))
    }
}

/// Identifier of a deploy version record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(pub u64);

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one workload: the pair every sub-resource name is derived from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkloadKey {
    pub workload_id: WorkloadId,
    pub owner_id: OwnerId,
}

impl WorkloadKey {
    pub fn new(workload_id: impl Into<WorkloadId>, owner_id: impl Into<OwnerId>) -> Self {
        Self {
            workload_id: workload_id.into(),
            owner_id: owner_id.into(),
        }
    }

    /// Canonical resource name, `w-{workload}-{owner}`
    pub fn name(&self) -> String {
        format!("w-{}-{}", self.workload_id, self.owner_id)
    }
}

impl fmt::Display for WorkloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w-{}-{}", self.workload_id, self.owner_id)
    }
}

/// Lowercase hex string built from `bytes` random bytes
pub fn random_hex(bytes: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..bytes)
        .map(|_| format!("{:02x}", rng.gen::<u8>()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_workload_key_name() {
        let key = WorkloadKey::new("abc123", "u1");
        assert_eq!(key.name(), "w-abc123-u1");
        assert_eq!(key.to_string(), key.name());
    }

    #[test]
    fn test_claim_id_shape() {
        let id = ClaimId::generate();
        assert_eq!(id.as_str().len(), 8);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&WorkloadId::new("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
        let version: VersionId = serde_json::from_str("42").unwrap();
        assert_eq!(version, VersionId(42));
    }

    proptest! {
        #[test]
        fn property_workload_name_is_deterministic(
            workload in "[a-z0-9]{1,12}",
            owner in "[a-z0-9]{1,12}",
        ) {
            let first = WorkloadKey::new(workload.as_str(), owner.as_str()).name();
            let second = WorkloadKey::new(workload.as_str(), owner.as_str()).name();
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first, format!("w-{}-{}", workload, owner));
        }
    }
}
