use super::{ControlContext, CREATE_DATA_RESOURCE, DELETE_DATA_RESOURCE, REGISTER_TENANT};
use crate::data_plane::TenantDatabase;
use crate::store::{DataResourceStore, TenantStore};
use anyhow::bail;
use async_trait::async_trait;
use ferry_cluster::{Api, ObjectMeta, SecretStore};
use ferry_jobs::Job;
use ferry_types::{random_hex, DataResource, DataResourceId, OwnerId, ProvisionStatus, Tenant};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Secret store holding a tenant's database credentials
pub fn tenant_secret_name(owner: &OwnerId) -> String {
    format!("tenant-db-{owner}")
}

/// Provision a tenant database and publish its credentials
pub struct RegisterTenantJob {
    ctx: Arc<ControlContext>,
    owner: OwnerId,
}

impl RegisterTenantJob {
    pub fn new(ctx: Arc<ControlContext>, owner: OwnerId) -> Self {
        Self { ctx, owner }
    }

    async fn provision(&self) -> anyhow::Result<TenantDatabase> {
        let password = random_hex(16);
        let database = self
            .ctx
            .data_plane
            .create_tenant_database(&self.owner, &password)
            .await?;
        self.publish_credentials(&database).await?;
        Ok(database)
    }

    async fn publish_credentials(&self, database: &TenantDatabase) -> anyhow::Result<()> {
        let api = Api::<SecretStore>::namespaced(
            self.ctx.cluster.as_ref(),
            &self.ctx.settings.data_namespace,
        );
        let labels = BTreeMap::from([
            ("app".to_string(), "tenant-db".to_string()),
            ("owner-id".to_string(), self.owner.to_string()),
        ]);
        let mut desired = SecretStore {
            metadata: ObjectMeta::new(
                self.ctx.settings.data_namespace.clone(),
                tenant_secret_name(&self.owner),
            )
            .with_labels(labels),
            data: BTreeMap::from([
                ("DB_HOST".to_string(), database.host.clone()),
                ("DB_PORT".to_string(), database.port.to_string()),
                ("DB_NAME".to_string(), database.database.clone()),
                ("DB_USER".to_string(), database.user.clone()),
                ("DB_PASSWORD".to_string(), database.password.clone()),
            ]),
        };

        match api.get(&desired.metadata.name).await? {
            None => {
                api.create(desired).await?;
            }
            Some(live) => {
                desired.metadata.resource_version = live.metadata.resource_version;
                api.update(desired).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Job for RegisterTenantJob {
    fn job_type(&self) -> &'static str {
        REGISTER_TENANT
    }

    fn id(&self) -> String {
        self.owner.to_string()
    }

    async fn execute(&self) -> anyhow::Result<()> {
        let store = self.ctx.store.as_ref();
        let mut tenant = store
            .get_tenant(&self.owner)
            .await?
            .unwrap_or_else(|| Tenant::new(self.owner.clone()));

        let result = self.provision().await;
        match &result {
            Ok(database) => {
                tenant.status = ProvisionStatus::Active;
                tenant.message = None;
                tracing::info!(owner = %self.owner, database = %database.database, "Tenant registered");
            }
            Err(e) => {
                tenant.status = ProvisionStatus::Error;
                tenant.message = Some(format!("{e:#}"));
            }
        }
        store.upsert_tenant(tenant).await?;
        result.map(|_| ())
    }
}

/// Create a schema in the tenant database
pub struct CreateDataResourceJob {
    ctx: Arc<ControlContext>,
    owner: OwnerId,
    resource: DataResourceId,
}

impl CreateDataResourceJob {
    pub fn new(ctx: Arc<ControlContext>, owner: OwnerId, resource: DataResourceId) -> Self {
        Self {
            ctx,
            owner,
            resource,
        }
    }
}

#[async_trait]
impl Job for CreateDataResourceJob {
    fn job_type(&self) -> &'static str {
        CREATE_DATA_RESOURCE
    }

    fn id(&self) -> String {
        self.resource.to_string()
    }

    async fn execute(&self) -> anyhow::Result<()> {
        let store = self.ctx.store.as_ref();
        let mut record = store
            .get_data_resource(&self.resource)
            .await?
            .unwrap_or_else(|| DataResource::relational(self.resource.clone(), self.owner.clone()));
        if record.owner_id != self.owner {
            bail!("data resource {} belongs to {}", self.resource, record.owner_id);
        }

        let result = self
            .ctx
            .data_plane
            .create_schema(&self.owner, &self.resource)
            .await;
        match &result {
            Ok(()) => {
                record.status = ProvisionStatus::Active;
                record.message = None;
                tracing::info!(owner = %self.owner, resource = %self.resource, "Data resource created");
            }
            Err(e) => {
                record.status = ProvisionStatus::Error;
                record.message = Some(e.to_string());
            }
        }
        store.upsert_data_resource(record).await?;
        Ok(result?)
    }
}

/// Drop a schema and forget the record
pub struct DeleteDataResourceJob {
    ctx: Arc<ControlContext>,
    owner: OwnerId,
    resource: DataResourceId,
}

impl DeleteDataResourceJob {
    pub fn new(ctx: Arc<ControlContext>, owner: OwnerId, resource: DataResourceId) -> Self {
        Self {
            ctx,
            owner,
            resource,
        }
    }
}

#[async_trait]
impl Job for DeleteDataResourceJob {
    fn job_type(&self) -> &'static str {
        DELETE_DATA_RESOURCE
    }

    fn id(&self) -> String {
        self.resource.to_string()
    }

    async fn execute(&self) -> anyhow::Result<()> {
        let store = self.ctx.store.as_ref();
        if let Some(record) = store.get_data_resource(&self.resource).await? {
            if record.owner_id != self.owner {
                bail!("data resource {} belongs to {}", self.resource, record.owner_id);
            }
        }

        if let Err(e) = self
            .ctx
            .data_plane
            .drop_schema(&self.owner, &self.resource)
            .await
        {
            if let Some(mut record) = store.get_data_resource(&self.resource).await? {
                record.status = ProvisionStatus::Error;
                record.message = Some(e.to_string());
                store.upsert_data_resource(record).await?;
            }
            return Err(e.into());
        }

        let existed = store.delete_data_resource(&self.resource).await?;
        tracing::info!(owner = %self.owner, resource = %self.resource, existed, "Data resource deleted");
        Ok(())
    }
}
