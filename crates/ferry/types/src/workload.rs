//! Workload desired-state descriptor
//!
//! A [`WorkloadSpec`] describes the runtime shape of one tenant workload. Every
//! cluster sub-resource of the workload is named after [`WorkloadSpec::name`],
//! which is derived from the workload and owner ids and never regenerated.

use crate::{OwnerId, VersionId, WorkloadId, WorkloadKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_CPU: &str = "1";
pub const DEFAULT_MEMORY: &str = "500Mi";
pub const DEFAULT_EPHEMERAL_STORAGE: &str = "2Gi";

/// Platform API endpoint injected into every workload
pub const ENV_API_ENDPOINT: &str = "FERRY_API_ENDPOINT";
/// Owner identity injected into every workload
pub const ENV_OWNER_ID: &str = "FERRY_OWNER_ID";
/// Owner credential injected into every workload
pub const ENV_OWNER_SECRET: &str = "FERRY_OWNER_SECRET";

/// System-managed keys. They live in the secret store only.
pub const RESERVED_ENV_KEYS: [&str; 3] = [ENV_API_ENDPOINT, ENV_OWNER_ID, ENV_OWNER_SECRET];

pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_ENV_KEYS.contains(&key)
}

/// Remove every reserved key from `data`. Returns true if anything was removed.
pub fn strip_reserved(data: &mut BTreeMap<String, String>) -> bool {
    let before = data.len();
    data.retain(|key, _| !is_reserved_key(key));
    data.len() != before
}

/// Desired state of one workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub workload_id: WorkloadId,
    pub owner_id: OwnerId,

    /// Credential injected as [`ENV_OWNER_SECRET`]
    #[serde(default)]
    pub owner_secret: String,

    /// Container image reference
    pub image: String,

    /// Port the container listens on
    pub port: u16,

    #[serde(default)]
    pub cpu: Option<String>,

    #[serde(default)]
    pub memory: Option<String>,

    #[serde(default)]
    pub ephemeral_storage: Option<String>,

    /// Maximum replica count; anything below 1 means 1
    #[serde(default)]
    pub max_replicas: i32,

    /// Hard placement constraint on the node region, when set
    #[serde(default)]
    pub region: Option<String>,
}

impl WorkloadSpec {
    pub fn new(
        workload_id: impl Into<WorkloadId>,
        owner_id: impl Into<OwnerId>,
        image: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            workload_id: workload_id.into(),
            owner_id: owner_id.into(),
            owner_secret: String::new(),
            image: image.into(),
            port,
            cpu: None,
            memory: None,
            ephemeral_storage: None,
            max_replicas: 0,
            region: None,
        }
    }

    pub fn with_owner_secret(mut self, secret: impl Into<String>) -> Self {
        self.owner_secret = secret.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_max_replicas(mut self, replicas: i32) -> Self {
        self.max_replicas = replicas;
        self
    }

    pub fn key(&self) -> WorkloadKey {
        WorkloadKey {
            workload_id: self.workload_id.clone(),
            owner_id: self.owner_id.clone(),
        }
    }

    /// Canonical resource name shared by all sub-resources
    pub fn name(&self) -> String {
        self.key().name()
    }

    pub fn config_store_name(&self) -> String {
        format!("{}-env", self.name())
    }

    pub fn secret_store_name(&self) -> String {
        format!("{}-secret", self.name())
    }

    /// Labels stamped on every sub-resource
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("app".to_string(), self.name()),
            ("workload-id".to_string(), self.workload_id.to_string()),
            ("owner-id".to_string(), self.owner_id.to_string()),
        ])
    }

    /// Effective replica count
    pub fn replicas(&self) -> i32 {
        if self.max_replicas > 0 {
            self.max_replicas
        } else {
            1
        }
    }

    /// Resource quantities with defaults applied to unset or blank fields
    pub fn quantities(&self) -> ResourceQuantities {
        fn pick(value: &Option<String>, default: &str) -> String {
            match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => v.to_string(),
                _ => default.to_string(),
            }
        }

        ResourceQuantities {
            cpu: pick(&self.cpu, DEFAULT_CPU),
            memory: pick(&self.memory, DEFAULT_MEMORY),
            ephemeral_storage: pick(&self.ephemeral_storage, DEFAULT_EPHEMERAL_STORAGE),
        }
    }

    /// Values of the reserved keys for this workload
    pub fn reserved_env(&self, api_endpoint: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (ENV_API_ENDPOINT.to_string(), api_endpoint.to_string()),
            (ENV_OWNER_ID.to_string(), self.owner_id.to_string()),
            (ENV_OWNER_SECRET.to_string(), self.owner_secret.clone()),
        ])
    }

    /// Adopt the image and port of a deploy version
    pub fn apply_version(&mut self, version: &DeployVersion) {
        self.image = version.image.clone();
        self.port = version.port;
    }
}

/// CPU, memory and ephemeral storage, used for both limits and requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQuantities {
    pub cpu: String,
    pub memory: String,
    pub ephemeral_storage: String,
}

/// Convergence phase of a workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkloadPhase {
    Deploying,
    Failed,
    Running,
}

impl fmt::Display for WorkloadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkloadPhase::Deploying => "Deploying",
            WorkloadPhase::Failed => "Failed",
            WorkloadPhase::Running => "Running",
        };
        f.write_str(s)
    }
}

/// Phase plus message, written back for the request layer to poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadStatus {
    pub phase: WorkloadPhase,
    pub message: String,
    pub updated_at: DateTime<Utc>,
}

impl WorkloadStatus {
    pub fn deploying() -> Self {
        Self::with_phase(WorkloadPhase::Deploying, "reconciling")
    }

    pub fn running() -> Self {
        Self::with_phase(WorkloadPhase::Running, "all resources converged")
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::with_phase(WorkloadPhase::Failed, message)
    }

    fn with_phase(phase: WorkloadPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            updated_at: Utc::now(),
        }
    }
}

/// User-supplied environment of a workload, as persisted by the request layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadEnv {
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
}

/// Outcome of applying a deploy version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    Pending,
    Success,
    Error,
}

/// One deployable revision of a workload (image + port)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployVersion {
    pub version_id: VersionId,
    pub workload_id: WorkloadId,
    pub owner_id: OwnerId,
    pub image: String,
    pub port: u16,
    pub status: VersionStatus,
    #[serde(default)]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DeployVersion {
    pub fn new(
        version_id: VersionId,
        key: &WorkloadKey,
        image: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            version_id,
            workload_id: key.workload_id.clone(),
            owner_id: key.owner_id.clone(),
            image: image.into(),
            port,
            status: VersionStatus::Pending,
            message: None,
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> WorkloadKey {
        WorkloadKey {
            workload_id: self.workload_id.clone(),
            owner_id: self.owner_id.clone(),
        }
    }
}
