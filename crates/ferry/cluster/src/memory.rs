//! In-memory cluster backend
//!
//! Behaves like the real API for the operations Ferry uses: resource versions
//! advance on every write and updates with a stale version are rejected.
//! Every successful write is recorded so tests can count mutations.

use crate::client::ClusterClient;
use crate::error::{ClusterError, ClusterResult};
use crate::resources::{ClusterObject, ResourceKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

type ObjectKey = (ResourceKind, String, String);

/// Client operations, used for failure injection and the mutation log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Get,
    Create,
    Update,
    Delete,
}

/// One successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub operation: Operation,
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

/// In-memory cluster for development and testing
#[derive(Debug)]
pub struct InMemoryCluster {
    objects: Arc<RwLock<HashMap<ObjectKey, ClusterObject>>>,
    mutations: Arc<RwLock<Vec<Mutation>>>,
    failures: Arc<RwLock<HashMap<(ResourceKind, Operation), String>>>,
    next_version: Arc<AtomicU64>,
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            mutations: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            next_version: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Make every `operation` on `kind` fail with a 500 carrying `message`
    pub async fn fail_on(&self, kind: ResourceKind, operation: Operation, message: impl Into<String>) {
        self.failures
            .write()
            .await
            .insert((kind, operation), message.into());
    }

    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    /// All successful writes so far, oldest first
    pub async fn mutations(&self) -> Vec<Mutation> {
        self.mutations.read().await.clone()
    }

    pub async fn mutation_count(&self) -> usize {
        self.mutations.read().await.len()
    }

    /// Number of stored resources of a kind, across namespaces
    pub async fn count(&self, kind: ResourceKind) -> usize {
        self.objects
            .read()
            .await
            .keys()
            .filter(|(k, _, _)| *k == kind)
            .count()
    }

    async fn check_failure(&self, kind: ResourceKind, operation: Operation) -> ClusterResult<()> {
        match self.failures.read().await.get(&(kind, operation)) {
            Some(message) => Err(ClusterError::Api {
                status: 500,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn record(&self, operation: Operation, key: &ObjectKey) {
        let (kind, namespace, name) = key.clone();
        tracing::trace!(?operation, %kind, %namespace, %name, "Cluster mutation");
        self.mutations.write().await.push(Mutation {
            operation,
            kind,
            namespace,
            name,
        });
    }

    fn bump_version(&self, object: &mut ClusterObject) {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        object.metadata_mut().resource_version = Some(version.to_string());
    }
}

fn key_of(object: &ClusterObject) -> ObjectKey {
    let meta = object.metadata();
    (object.kind(), meta.namespace.clone(), meta.name.clone())
}

#[async_trait]
impl ClusterClient for InMemoryCluster {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<ClusterObject>> {
        self.check_failure(kind, Operation::Get).await?;
        let objects = self.objects.read().await;
        Ok(objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create(&self, mut object: ClusterObject) -> ClusterResult<ClusterObject> {
        let kind = object.kind();
        self.check_failure(kind, Operation::Create).await?;
        let key = key_of(&object);

        {
            let mut objects = self.objects.write().await;
            if objects.contains_key(&key) {
                return Err(ClusterError::AlreadyExists {
                    kind,
                    namespace: key.1,
                    name: key.2,
                });
            }
            self.bump_version(&mut object);
            objects.insert(key.clone(), object.clone());
        }

        self.record(Operation::Create, &key).await;
        Ok(object)
    }

    async fn update(&self, mut object: ClusterObject) -> ClusterResult<ClusterObject> {
        let kind = object.kind();
        self.check_failure(kind, Operation::Update).await?;
        let key = key_of(&object);

        {
            let mut objects = self.objects.write().await;
            let live = objects
                .get(&key)
                .ok_or_else(|| ClusterError::not_found(kind, &key.1, &key.2))?;

            if let Some(version) = &object.metadata().resource_version {
                if live.metadata().resource_version.as_ref() != Some(version) {
                    return Err(ClusterError::Conflict {
                        kind,
                        namespace: key.1,
                        name: key.2,
                    });
                }
            }

            self.bump_version(&mut object);
            objects.insert(key.clone(), object.clone());
        }

        self.record(Operation::Update, &key).await;
        Ok(object)
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> ClusterResult<()> {
        self.check_failure(kind, Operation::Delete).await?;
        let key = (kind, namespace.to_string(), name.to_string());

        if self.objects.write().await.remove(&key).is_none() {
            return Err(ClusterError::not_found(kind, namespace, name));
        }

        self.record(Operation::Delete, &key).await;
        Ok(())
    }
}
