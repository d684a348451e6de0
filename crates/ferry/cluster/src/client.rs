//! The cluster client seam
//!
//! Backends implement the object-safe [`ClusterClient`]; callers usually go
//! through the typed [`Api`] wrapper instead.

use crate::error::{ClusterError, ClusterResult};
use crate::resources::{ClusterObject, Resource, ResourceKind};
use async_trait::async_trait;
use std::marker::PhantomData;

/// Read and write access to cluster resources
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch a resource. `Ok(None)` when it does not exist.
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<ClusterObject>>;

    /// Create a resource; fails with `AlreadyExists` if the name is taken
    async fn create(&self, object: ClusterObject) -> ClusterResult<ClusterObject>;

    /// Replace a resource. A set resource version must match the live one.
    async fn update(&self, object: ClusterObject) -> ClusterResult<ClusterObject>;

    /// Delete a resource; fails with `NotFound` if it does not exist
    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> ClusterResult<()>;
}

/// Typed access to one resource kind in one namespace
pub struct Api<'a, R> {
    client: &'a dyn ClusterClient,
    namespace: &'a str,
    _marker: PhantomData<fn() -> R>,
}

impl<'a, R: Resource> Api<'a, R> {
    pub fn namespaced(client: &'a dyn ClusterClient, namespace: &'a str) -> Self {
        Self {
            client,
            namespace,
            _marker: PhantomData,
        }
    }

    pub fn namespace(&self) -> &str {
        self.namespace
    }

    pub async fn get(&self, name: &str) -> ClusterResult<Option<R>> {
        match self.client.get(R::KIND, self.namespace, name).await? {
            Some(object) => Self::downcast(object).map(Some),
            None => Ok(None),
        }
    }

    pub async fn create(&self, resource: R) -> ClusterResult<R> {
        let created = self.client.create(resource.into_object()).await?;
        Self::downcast(created)
    }

    pub async fn update(&self, resource: R) -> ClusterResult<R> {
        let updated = self.client.update(resource.into_object()).await?;
        Self::downcast(updated)
    }

    pub async fn delete(&self, name: &str) -> ClusterResult<()> {
        self.client.delete(R::KIND, self.namespace, name).await
    }

    /// Delete, treating an already-absent resource as success.
    /// Returns whether anything was removed.
    pub async fn delete_if_exists(&self, name: &str) -> ClusterResult<bool> {
        match self.delete(name).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn downcast(object: ClusterObject) -> ClusterResult<R> {
        let kind = object.kind();
        R::from_object(object).ok_or_else(|| {
            ClusterError::InvalidResponse(format!("expected {}, backend returned {}", R::KIND, kind))
        })
    }
}
