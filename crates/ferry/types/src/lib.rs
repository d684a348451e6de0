//! Ferry Types - Core types for the workload control plane
//!
//! Ferry converges tenant workloads, custom domains and data resources in an
//! external cluster toward the desired state recorded by a request layer.
//!
//! ## Key Concepts
//!
//! - **WorkloadSpec**: versioned desired state of one container workload
//! - **CustomDomain**: a claim on a domain, verified through DNS
//! - **Tenant / DataResource**: per-owner database provisioning records
//!
//! Everything here is plain data; behavior lives in `ferry-control`.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod domain;
pub mod ids;
pub mod tenant;
pub mod workload;

pub use domain::{claim_resource_name, normalize_fqdn, CustomDomain, DomainStatus};
pub use ids::{random_hex, ClaimId, DataResourceId, OwnerId, VersionId, WorkloadId, WorkloadKey};
pub use tenant::{sanitize_identifier, DataResource, DataResourceKind, ProvisionStatus, Tenant};
pub use workload::{
    is_reserved_key, strip_reserved, DeployVersion, ResourceQuantities, VersionStatus,
    WorkloadEnv, WorkloadPhase, WorkloadSpec, WorkloadStatus, ENV_API_ENDPOINT, ENV_OWNER_ID,
    ENV_OWNER_SECRET, RESERVED_ENV_KEYS,
};
