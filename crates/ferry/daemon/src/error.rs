//! Error types for ferryd

use ferry_cluster::ClusterError;
use ferry_control::{DataPlaneError, DnsError, StoreError, TaskError};
use ferry_jobs::CronError;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("DNS error: {0}")]
    Dns(#[from] DnsError),

    #[error("Data plane error: {0}")]
    DataPlane(#[from] DataPlaneError),

    #[error("Scheduler error: {0}")]
    Cron(#[from] CronError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    /// A one-shot job ran and failed
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for DaemonError {
    fn from(e: config::ConfigError) -> Self {
        DaemonError::Config(e.to_string())
    }
}

pub type DaemonResult<T> = Result<T, DaemonError>;
