//! Error types for cluster backends

use crate::resources::ResourceKind;
use thiserror::Error;

pub type ClusterResult<T> = Result<T, ClusterError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClusterError {
    /// The addressed resource does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },

    /// Create of a name that is already taken
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },

    /// Update carried a stale resource version
    #[error("Conflicting write to {kind} {namespace}/{name}")]
    Conflict {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },

    /// The API answered with an error status
    #[error("Cluster API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The request never got an answer
    #[error("Transport error: {0}")]
    Transport(String),

    /// The answer could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ClusterError {
    pub fn not_found(kind: ResourceKind, namespace: &str, name: &str) -> Self {
        ClusterError::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}

impl From<reqwest::Error> for ClusterError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClusterError::InvalidResponse(e.to_string())
        } else {
            ClusterError::Transport(e.to_string())
        }
    }
}
