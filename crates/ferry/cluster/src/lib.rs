//! Ferry Cluster - typed cluster resources behind a narrow client trait
//!
//! Reconciliation code works only with the structs in [`resources`] and the
//! [`ClusterClient`] trait. Two backends are provided:
//!
//! - [`InMemoryCluster`]: versioned in-memory store with a mutation log
//! - [`KubeCluster`]: Kubernetes REST API (core, apps, traefik, cert-manager)

pub mod client;
pub mod error;
pub mod kube;
pub mod manifest;
pub mod memory;
pub mod resources;

pub use client::{Api, ClusterClient};
pub use error::{ClusterError, ClusterResult};
pub use kube::KubeCluster;
pub use memory::{InMemoryCluster, Mutation, Operation};
pub use resources::*;
