//! Ferry Control - the processing core of the control plane
//!
//! - [`reconciler`]: converges the five cluster resources of a workload
//! - [`domain`]: custom-domain claims, DNS verification and provisioning
//! - [`jobs`]: the job variants executed by a `ferry_jobs::Processor`
//! - [`tasks`]: builds jobs from request-layer task types and payloads
//! - [`store`], [`dns`], [`data_plane`]: the external dependencies, each
//!   behind a trait with an in-memory implementation
//!
//! ## Features
//!
//! - `postgres`: `PostgresStore` and `SqlDataPlane`

#![deny(unsafe_code)]

pub mod data_plane;
pub mod dns;
pub mod domain;
pub mod error;
pub mod jobs;
pub mod reconciler;
pub mod settings;
pub mod store;
pub mod tasks;

pub use data_plane::{DataPlane, InMemoryDataPlane, TenantDatabase};
#[cfg(feature = "postgres")]
pub use data_plane::SqlDataPlane;
pub use dns::{DnsResolver, DohResolver, StaticResolver};
pub use domain::{
    DomainProvisioner, DomainService, DomainVerifier, ScheduledRuns, VerificationSettings,
};
pub use error::{
    DataPlaneError, DnsError, DomainError, ProvisionError, ReconcileError, StoreError, StoreResult,
    TaskError,
};
pub use jobs::ControlContext;
pub use reconciler::Reconciler;
pub use settings::PlatformSettings;
pub use store::{InMemoryStore, Store};
#[cfg(feature = "postgres")]
pub use store::PostgresStore;
pub use tasks::{AuditListener, TaskFactory, TASK_TYPES};
