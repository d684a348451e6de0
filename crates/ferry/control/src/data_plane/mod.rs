//! Tenant database provisioning
//!
//! Each tenant owns one database and one login role. Data resources are
//! schemas inside that database, granted to the tenant role.

mod memory;
#[cfg(feature = "postgres")]
mod sql;

pub use memory::InMemoryDataPlane;
#[cfg(feature = "postgres")]
pub use sql::SqlDataPlane;

use crate::error::DataPlaneError;
use async_trait::async_trait;
use ferry_types::{sanitize_identifier, DataResourceId, OwnerId};

pub type DataPlaneResult<T> = Result<T, DataPlaneError>;

/// Connection details handed to the tenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantDatabase {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

#[async_trait]
pub trait DataPlane: Send + Sync {
    /// Create the tenant database and role, or reset the role password if
    /// they already exist
    async fn create_tenant_database(
        &self,
        owner: &OwnerId,
        password: &str,
    ) -> DataPlaneResult<TenantDatabase>;

    async fn create_schema(&self, owner: &OwnerId, resource: &DataResourceId) -> DataPlaneResult<()>;

    /// Drop a schema and everything in it; absent schemas are fine
    async fn drop_schema(&self, owner: &OwnerId, resource: &DataResourceId) -> DataPlaneResult<()>;
}

pub fn database_name(owner: &OwnerId) -> String {
    format!("db_{}", sanitize_identifier(owner.as_str()))
}

pub fn role_name(owner: &OwnerId) -> String {
    format!("user_{}", sanitize_identifier(owner.as_str()))
}

pub fn schema_name(resource: &DataResourceId) -> String {
    format!("schema_{}", sanitize_identifier(resource.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_names() {
        let owner = OwnerId::new("User-1.a");
        assert_eq!(database_name(&owner), "db_user_1_a");
        assert_eq!(role_name(&owner), "user_user_1_a");
        assert_eq!(schema_name(&DataResourceId::new("orders-v2")), "schema_orders_v2");
    }
}
