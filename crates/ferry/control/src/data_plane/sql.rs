//! Data plane backed by a PostgreSQL-compatible admin connection

use super::{database_name, role_name, schema_name, DataPlane, DataPlaneResult, TenantDatabase};
use crate::error::DataPlaneError;
use async_trait::async_trait;
use ferry_types::{DataResourceId, OwnerId};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, Connection, PgPool};
use std::str::FromStr;
use std::time::Duration;

pub struct SqlDataPlane {
    pool: PgPool,
    admin_options: PgConnectOptions,
    host: String,
    port: u16,
}

impl SqlDataPlane {
    /// `host` and `port` are what tenants connect to, which may differ from
    /// the admin address
    pub async fn connect(admin_url: &str, host: &str, port: u16) -> DataPlaneResult<Self> {
        let admin_options = PgConnectOptions::from_str(admin_url)
            .map_err(|e| DataPlaneError::Unavailable(e.to_string()))?;
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(admin_options.clone())
            .await
            .map_err(|e| DataPlaneError::Unavailable(e.to_string()))?;

        Ok(Self {
            pool,
            admin_options,
            host: host.to_string(),
            port,
        })
    }

    async fn exists(&self, sql: &str, name: &str) -> DataPlaneResult<bool> {
        let row = sqlx::query(sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(statement_error)?;
        Ok(row.is_some())
    }

    async fn execute(&self, sql: &str) -> DataPlaneResult<()> {
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(statement_error)?;
        Ok(())
    }

    /// Run statements inside the tenant's own database
    async fn execute_in(&self, database: &str, statements: &[String]) -> DataPlaneResult<()> {
        let mut conn = self
            .admin_options
            .clone()
            .database(database)
            .connect()
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.code().as_deref() == Some("3D000") => {
                    DataPlaneError::MissingDatabase(database.to_string())
                }
                other => DataPlaneError::Unavailable(other.to_string()),
            })?;

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&mut conn)
                .await
                .map_err(statement_error)?;
        }

        conn.close().await.map_err(statement_error)?;
        Ok(())
    }
}

fn statement_error(e: sqlx::Error) -> DataPlaneError {
    DataPlaneError::Statement(e.to_string())
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[async_trait]
impl DataPlane for SqlDataPlane {
    async fn create_tenant_database(
        &self,
        owner: &OwnerId,
        password: &str,
    ) -> DataPlaneResult<TenantDatabase> {
        let database = database_name(owner);
        let role = role_name(owner);

        if self
            .exists("SELECT 1 FROM pg_roles WHERE rolname = $1", &role)
            .await?
        {
            self.execute(&format!(
                "ALTER USER {} WITH PASSWORD {}",
                quote_ident(&role),
                quote_literal(password)
            ))
            .await?;
        } else {
            self.execute(&format!(
                "CREATE USER {} WITH PASSWORD {}",
                quote_ident(&role),
                quote_literal(password)
            ))
            .await?;
        }

        if !self
            .exists("SELECT 1 FROM pg_database WHERE datname = $1", &database)
            .await?
        {
            self.execute(&format!("CREATE DATABASE {}", quote_ident(&database)))
                .await?;
        }

        self.execute(&format!(
            "GRANT ALL PRIVILEGES ON DATABASE {} TO {}",
            quote_ident(&database),
            quote_ident(&role)
        ))
        .await?;

        tracing::info!(owner = %owner, %database, "Tenant database ready");

        Ok(TenantDatabase {
            host: self.host.clone(),
            port: self.port,
            database,
            user: role,
            password: password.to_string(),
        })
    }

    async fn create_schema(&self, owner: &OwnerId, resource: &DataResourceId) -> DataPlaneResult<()> {
        let schema = quote_ident(&schema_name(resource));
        let role = quote_ident(&role_name(owner));
        self.execute_in(
            &database_name(owner),
            &[
                format!("CREATE SCHEMA IF NOT EXISTS {}", schema),
                format!("GRANT ALL ON SCHEMA {} TO {}", schema, role),
            ],
        )
        .await
    }

    async fn drop_schema(&self, owner: &OwnerId, resource: &DataResourceId) -> DataPlaneResult<()> {
        let schema = quote_ident(&schema_name(resource));
        self.execute_in(
            &database_name(owner),
            &[format!("DROP SCHEMA IF EXISTS {} CASCADE", schema)],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("db_u1"), "\"db_u1\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }
}
