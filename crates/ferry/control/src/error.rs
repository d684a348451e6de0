//! Error types for the control plane

use crate::domain::ProvisionStep;
use crate::reconciler::ReconcileStep;
use ferry_cluster::ClusterError;
use ferry_jobs::ProcessorError;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// State store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict (e.g., already exists)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query error
    #[error("Query error: {0}")]
    Query(String),
}

/// DNS lookup errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DnsError {
    /// The name does not exist
    #[error("No such domain: {0}")]
    NxDomain(String),

    #[error("Lookup of {name} failed: {message}")]
    Lookup { name: String, message: String },

    #[error("Invalid DNS response: {0}")]
    InvalidResponse(String),
}

/// Tenant database provisioning errors
#[derive(Debug, Error)]
pub enum DataPlaneError {
    #[error("Tenant database {0} does not exist")]
    MissingDatabase(String),

    #[error("Data plane unavailable: {0}")]
    Unavailable(String),

    #[error("Statement failed: {0}")]
    Statement(String),
}

/// A reconcile step failed; later steps were not attempted
#[derive(Debug, Error)]
#[error("{step} failed for {workload}: {source}")]
pub struct ReconcileError {
    pub step: ReconcileStep,
    pub workload: String,
    #[source]
    pub source: ClusterError,
}

/// A custom-domain provisioning step failed
#[derive(Debug, Error)]
#[error("{step} failed for claim {claim_id}: {source}")]
pub struct ProvisionError {
    pub step: ProvisionStep,
    pub claim_id: String,
    #[source]
    pub source: ClusterError,
}

/// Domain service errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid claim: {0}")]
    InvalidClaim(String),

    #[error("Claim {0} not found")]
    ClaimNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Could not schedule verification: {0}")]
    Schedule(#[from] ProcessorError),
}

/// Building or submitting a task from a request payload
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Unknown task type: {0}")]
    UnknownType(String),

    #[error("Invalid payload for {task_type}: {message}")]
    InvalidPayload { task_type: String, message: String },

    #[error(transparent)]
    Submit(#[from] ProcessorError),
}
