//! Typed descriptions of the cluster resources Ferry manages
//!
//! These are plain structs with named fields. Conversion to the cluster's wire
//! format happens only inside a backend (see [`crate::kube`]).

use ferry_types::ResourceQuantities;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Node label carrying the cloud region
pub const REGION_TOPOLOGY_KEY: &str = "topology.kubernetes.io/region";
/// Node label identifying a single host
pub const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

pub type Labels = BTreeMap<String, String>;

/// Kinds of resource a backend must support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    ConfigStore,
    SecretStore,
    Compute,
    NetworkEntry,
    RoutingRule,
    Certificate,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ConfigStore => "config-store",
            ResourceKind::SecretStore => "secret-store",
            ResourceKind::Compute => "compute",
            ResourceKind::NetworkEntry => "network-entry",
            ResourceKind::RoutingRule => "routing-rule",
            ResourceKind::Certificate => "certificate",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and bookkeeping common to every resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: Labels,
    /// Concurrency token assigned by the backend on every write
    #[serde(default)]
    pub resource_version: Option<String>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            labels: Labels::new(),
            resource_version: None,
        }
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }
}

/// Non-secret key/value configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigStore {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// Secret key/value configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretStore {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// A replicated container workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compute {
    pub metadata: ObjectMeta,
    pub spec: ComputeSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeSpec {
    pub replicas: i32,
    pub selector: Labels,
    pub pod_labels: Labels,
    pub container: ContainerSpec,
    pub placement: Placement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub port: u16,
    pub limits: ResourceQuantities,
    pub requests: ResourceQuantities,
    pub env_from: Vec<EnvSource>,
}

/// Where a container's environment is loaded from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum EnvSource {
    ConfigStore(String),
    SecretStore(String),
}

/// Scheduling constraints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Soft preference to share a node with matching pods
    pub preferred_colocation: Option<Colocation>,
    /// Hard requirement on the node region
    pub required_region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Colocation {
    pub weight: i32,
    pub match_labels: Labels,
    pub namespaces: Vec<String>,
    pub topology_key: String,
}

/// Stable network entry point in front of pods, or an alias for an external host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEntry {
    pub metadata: ObjectMeta,
    pub spec: NetworkEntrySpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetworkEntrySpec {
    ClusterIp { selector: Labels, port: u16 },
    ExternalName { external_name: String },
}

/// Host-based HTTP routing on an ingress entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub metadata: ObjectMeta,
    pub spec: RoutingRuleSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRuleSpec {
    pub entry_points: Vec<String>,
    pub host: String,
    pub backend: RouteBackend,
    pub tls_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteBackend {
    pub service: String,
    /// Namespace of the service when it differs from the rule's
    pub namespace: Option<String>,
    pub port: u16,
}

/// A request for an issued TLS certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRequest {
    pub metadata: ObjectMeta,
    pub spec: CertificateSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSpec {
    pub secret_name: String,
    pub dns_names: Vec<String>,
    pub issuer: IssuerRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerRef {
    pub name: String,
    pub kind: String,
}

/// Any resource, as passed through [`ClusterClient`](crate::ClusterClient)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ClusterObject {
    ConfigStore(ConfigStore),
    SecretStore(SecretStore),
    Compute(Compute),
    NetworkEntry(NetworkEntry),
    RoutingRule(RoutingRule),
    Certificate(CertificateRequest),
}

impl ClusterObject {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ClusterObject::ConfigStore(_) => ResourceKind::ConfigStore,
            ClusterObject::SecretStore(_) => ResourceKind::SecretStore,
            ClusterObject::Compute(_) => ResourceKind::Compute,
            ClusterObject::NetworkEntry(_) => ResourceKind::NetworkEntry,
            ClusterObject::RoutingRule(_) => ResourceKind::RoutingRule,
            ClusterObject::Certificate(_) => ResourceKind::Certificate,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ClusterObject::ConfigStore(r) => &r.metadata,
            ClusterObject::SecretStore(r) => &r.metadata,
            ClusterObject::Compute(r) => &r.metadata,
            ClusterObject::NetworkEntry(r) => &r.metadata,
            ClusterObject::RoutingRule(r) => &r.metadata,
            ClusterObject::Certificate(r) => &r.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            ClusterObject::ConfigStore(r) => &mut r.metadata,
            ClusterObject::SecretStore(r) => &mut r.metadata,
            ClusterObject::Compute(r) => &mut r.metadata,
            ClusterObject::NetworkEntry(r) => &mut r.metadata,
            ClusterObject::RoutingRule(r) => &mut r.metadata,
            ClusterObject::Certificate(r) => &mut r.metadata,
        }
    }
}

/// A concrete resource type addressable through [`Api`](crate::Api)
pub trait Resource: Clone + PartialEq + Send + Sync + 'static {
    const KIND: ResourceKind;

    fn metadata(&self) -> &ObjectMeta;
    fn metadata_mut(&mut self) -> &mut ObjectMeta;
    fn into_object(self) -> ClusterObject;
    fn from_object(object: ClusterObject) -> Option<Self>;
}

macro_rules! impl_resource {
    ($ty:ty, $variant:ident) => {
        impl Resource for $ty {
            const KIND: ResourceKind = ResourceKind::$variant;

            fn metadata(&self) -> &ObjectMeta {
                &self.metadata
            }

            fn metadata_mut(&mut self) -> &mut ObjectMeta {
                &mut self.metadata
            }

            fn into_object(self) -> ClusterObject {
                ClusterObject::$variant(self)
            }

            fn from_object(object: ClusterObject) -> Option<Self> {
                match object {
                    ClusterObject::$variant(r) => Some(r),
                    _ => None,
                }
            }
        }
    };
}

impl_resource!(ConfigStore, ConfigStore);
impl_resource!(SecretStore, SecretStore);
impl_resource!(Compute, Compute);
impl_resource!(NetworkEntry, NetworkEntry);
impl_resource!(RoutingRule, RoutingRule);
impl_resource!(CertificateRequest, Certificate);
