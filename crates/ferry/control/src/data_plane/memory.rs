//! In-memory data plane for development and testing

use super::{database_name, role_name, schema_name, DataPlane, DataPlaneResult, TenantDatabase};
use crate::error::DataPlaneError;
use async_trait::async_trait;
use ferry_types::{DataResourceId, OwnerId};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct TenantState {
    role: String,
    password: String,
    schemas: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryDataPlane {
    databases: Arc<RwLock<HashMap<String, TenantState>>>,
    unavailable: AtomicBool,
}

impl InMemoryDataPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn schemas(&self, owner: &OwnerId) -> Vec<String> {
        self.databases
            .read()
            .await
            .get(&database_name(owner))
            .map(|t| t.schemas.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn password(&self, owner: &OwnerId) -> Option<String> {
        self.databases
            .read()
            .await
            .get(&database_name(owner))
            .map(|t| t.password.clone())
    }

    fn check_available(&self) -> DataPlaneResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DataPlaneError::Unavailable("in-memory data plane switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DataPlane for InMemoryDataPlane {
    async fn create_tenant_database(
        &self,
        owner: &OwnerId,
        password: &str,
    ) -> DataPlaneResult<TenantDatabase> {
        self.check_available()?;
        let database = database_name(owner);
        let role = role_name(owner);

        let mut databases = self.databases.write().await;
        let state = databases.entry(database.clone()).or_insert_with(|| TenantState {
            role: role.clone(),
            password: String::new(),
            schemas: BTreeSet::new(),
        });
        state.password = password.to_string();

        Ok(TenantDatabase {
            host: "localhost".to_string(),
            port: 5432,
            database,
            user: state.role.clone(),
            password: password.to_string(),
        })
    }

    async fn create_schema(&self, owner: &OwnerId, resource: &DataResourceId) -> DataPlaneResult<()> {
        self.check_available()?;
        let database = database_name(owner);
        let mut databases = self.databases.write().await;
        let state = databases
            .get_mut(&database)
            .ok_or(DataPlaneError::MissingDatabase(database))?;
        state.schemas.insert(schema_name(resource));
        Ok(())
    }

    async fn drop_schema(&self, owner: &OwnerId, resource: &DataResourceId) -> DataPlaneResult<()> {
        self.check_available()?;
        if let Some(state) = self.databases.write().await.get_mut(&database_name(owner)) {
            state.schemas.remove(&schema_name(resource));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_requires_database() {
        let plane = InMemoryDataPlane::new();
        let owner = OwnerId::new("u1");
        let resource = DataResourceId::new("orders");

        assert!(matches!(
            plane.create_schema(&owner, &resource).await,
            Err(DataPlaneError::MissingDatabase(db)) if db == "db_u1"
        ));

        let db = plane.create_tenant_database(&owner, "pw").await.unwrap();
        assert_eq!(db.database, "db_u1");
        assert_eq!(db.user, "user_u1");

        plane.create_schema(&owner, &resource).await.unwrap();
        plane.create_schema(&owner, &resource).await.unwrap();
        assert_eq!(plane.schemas(&owner).await, vec!["schema_orders".to_string()]);

        plane.drop_schema(&owner, &resource).await.unwrap();
        plane.drop_schema(&owner, &resource).await.unwrap();
        assert!(plane.schemas(&owner).await.is_empty());
    }

    #[tokio::test]
    async fn test_reregistration_resets_password() {
        let plane = InMemoryDataPlane::new();
        let owner = OwnerId::new("u1");
        plane.create_tenant_database(&owner, "first").await.unwrap();
        plane.create_tenant_database(&owner, "second").await.unwrap();
        assert_eq!(plane.password(&owner).await.as_deref(), Some("second"));
    }
}
