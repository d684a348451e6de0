//! Daemon wiring and lifecycle

use crate::config::{ClusterConfig, DaemonConfig, DataPlaneConfig, DnsConfig, StorageConfig};
use crate::error::{DaemonError, DaemonResult};
use ferry_cluster::{ClusterClient, InMemoryCluster, KubeCluster};
use ferry_control::jobs::{self, AuditWorkloadsJob, DomainCheckJob};
use ferry_control::{
    AuditListener, ControlContext, DataPlane, DnsResolver, DohResolver, DomainProvisioner,
    DomainService, DomainVerifier, InMemoryDataPlane, InMemoryStore, StaticResolver, Store,
    TaskFactory,
};
use ferry_jobs::{BoxedJob, CronScheduler, Processor};
use std::path::Path;
use std::sync::Arc;

/// External dependencies the daemon runs against
pub struct Backends {
    pub store: Arc<dyn Store>,
    pub cluster: Arc<dyn ClusterClient>,
    pub dns: Arc<dyn DnsResolver>,
    pub data_plane: Arc<dyn DataPlane>,
}

impl Backends {
    /// Connect every backend named in the configuration
    pub async fn connect(config: &DaemonConfig) -> DaemonResult<Self> {
        Ok(Self {
            store: connect_store(&config.storage).await?,
            cluster: connect_cluster(&config.cluster)?,
            dns: connect_dns(&config.dns)?,
            data_plane: connect_data_plane(&config.data_plane).await?,
        })
    }
}

async fn connect_store(config: &StorageConfig) -> DaemonResult<Arc<dyn Store>> {
    match config {
        StorageConfig::Memory => {
            tracing::warn!("Using in-memory storage; state is lost on exit");
            Ok(Arc::new(InMemoryStore::new()))
        }
        #[cfg(feature = "postgres")]
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            let store =
                ferry_control::PostgresStore::new(url, *max_connections, *connect_timeout_secs).await?;
            tracing::info!("Connected to PostgreSQL storage");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        StorageConfig::Postgres { .. } => Err(DaemonError::Config(
            "postgres storage requires the `postgres` feature".into(),
        )),
    }
}

fn connect_cluster(config: &ClusterConfig) -> DaemonResult<Arc<dyn ClusterClient>> {
    match config {
        ClusterConfig::Memory => {
            tracing::warn!("Using in-memory cluster; nothing is deployed");
            Ok(Arc::new(InMemoryCluster::new()))
        }
        ClusterConfig::Kubernetes {
            api_url,
            in_cluster: true,
            token_path,
            ..
        } => {
            let cluster =
                KubeCluster::in_cluster(api_url.as_deref(), token_path.as_deref().map(Path::new))?;
            Ok(Arc::new(cluster))
        }
        ClusterConfig::Kubernetes {
            api_url,
            token,
            accept_invalid_certs,
            ..
        } => {
            let api_url = api_url.as_deref().ok_or_else(|| {
                DaemonError::Config("cluster.api_url is required outside the cluster".into())
            })?;
            Ok(Arc::new(KubeCluster::new(
                api_url,
                token.clone(),
                *accept_invalid_certs,
            )?))
        }
    }
}

fn connect_dns(config: &DnsConfig) -> DaemonResult<Arc<dyn DnsResolver>> {
    match config {
        DnsConfig::Static => {
            tracing::warn!("Using static DNS tables; custom domains will not verify");
            Ok(Arc::new(StaticResolver::new()))
        }
        DnsConfig::Doh { endpoint } => Ok(Arc::new(DohResolver::new(endpoint)?)),
    }
}

async fn connect_data_plane(config: &DataPlaneConfig) -> DaemonResult<Arc<dyn DataPlane>> {
    match config {
        DataPlaneConfig::Memory => Ok(Arc::new(InMemoryDataPlane::new())),
        #[cfg(feature = "postgres")]
        DataPlaneConfig::Sql {
            admin_url,
            host,
            port,
        } => Ok(Arc::new(
            ferry_control::SqlDataPlane::connect(admin_url, host, *port).await?,
        )),
        #[cfg(not(feature = "postgres"))]
        DataPlaneConfig::Sql { .. } => Err(DaemonError::Config(
            "sql data plane requires the `postgres` feature".into(),
        )),
    }
}

/// The running control plane: two processors, the cron scheduler and the
/// request-layer entry points
pub struct Daemon {
    context: Arc<ControlContext>,
    tasks: Arc<Processor>,
    verification: Arc<Processor>,
    cron: CronScheduler,
    task_factory: TaskFactory,
    domains: DomainService,
}

impl Daemon {
    pub async fn new(config: &DaemonConfig) -> DaemonResult<Self> {
        let backends = Backends::connect(config).await?;
        Self::with_backends(config, backends).await
    }

    pub async fn with_backends(config: &DaemonConfig, backends: Backends) -> DaemonResult<Self> {
        config.validate()?;
        let Backends {
            store,
            cluster,
            dns,
            data_plane,
        } = backends;

        let context = Arc::new(ControlContext::new(
            store.clone(),
            cluster.clone(),
            data_plane,
            config.platform.clone(),
        ));

        let tasks = Arc::new(
            Processor::new("tasks", config.processor.clone())
                .with_listener(Arc::new(AuditListener::new(store.clone()))),
        );
        let verification = Arc::new(
            Processor::new("verification", config.verification.processor())
                .with_listener(Arc::new(AuditListener::new(store.clone()))),
        );

        let provisioner = Arc::new(DomainProvisioner::new(cluster, config.platform.clone()));
        let verifier = Arc::new(DomainVerifier::new(
            store.clone(),
            dns,
            provisioner.clone(),
            config.verification.settings(),
        ));
        let runs = verifier.runs().clone();
        let domains = DomainService::new(store, verifier, provisioner, verification.clone());
        let task_factory = TaskFactory::new(context.clone(), tasks.clone());

        let cron = CronScheduler::new(tasks.clone());
        {
            let ctx = context.clone();
            cron.register_job(jobs::AUDIT_WORKLOADS, config.cron.audit_interval(), move || {
                Box::new(AuditWorkloadsJob::new(ctx.clone())) as BoxedJob
            })
            .await?;
        }
        {
            let ctx = context.clone();
            let stale_after = config.cron.stale_after();
            cron.register_job(
                jobs::DOMAIN_CHECK,
                config.cron.domain_check_interval(),
                move || Box::new(DomainCheckJob::new(ctx.clone(), runs.clone(), stale_after)) as BoxedJob,
            )
            .await?;
        }

        Ok(Self {
            context,
            tasks,
            verification,
            cron,
            task_factory,
            domains,
        })
    }

    pub fn context(&self) -> &Arc<ControlContext> {
        &self.context
    }

    pub fn tasks(&self) -> &TaskFactory {
        &self.task_factory
    }

    pub fn domains(&self) -> &DomainService {
        &self.domains
    }

    /// Start both processors and arm the periodic jobs
    pub async fn start(&self) {
        self.tasks.start().await;
        self.verification.start().await;
        self.cron.start().await;
    }

    /// Stop the timers, then drain the task processor, then the
    /// verification processor
    pub async fn shutdown(&self) {
        self.cron.close().await;
        self.tasks.close().await;
        self.verification.close().await;
    }

    /// Run until Ctrl-C or SIGTERM
    pub async fn run(self) -> DaemonResult<()> {
        self.start().await;
        tracing::info!(
            periodic_jobs = ?self.cron.job_names().await,
            "Ferry daemon running"
        );

        shutdown_signal().await;

        tracing::info!("Ferry daemon shutting down");
        self.shutdown().await;
        Ok(())
    }

    /// Run one registered periodic job now and wait for it
    pub async fn trigger_once(&self, name: &str) -> DaemonResult<()> {
        self.tasks.start().await;
        self.verification.start().await;
        let submitted = self.cron.trigger(name).await;
        self.shutdown().await;
        submitted?;
        self.check_failures()
    }

    /// Build one task, run it and wait for it
    pub async fn submit_once(
        &self,
        task_type: &str,
        payload: serde_json::Value,
    ) -> DaemonResult<String> {
        self.tasks.start().await;
        self.verification.start().await;
        let submitted = self.task_factory.submit_task(task_type, payload).await;
        self.shutdown().await;
        let job_id = submitted?;
        self.check_failures()?;
        Ok(job_id)
    }

    fn check_failures(&self) -> DaemonResult<()> {
        let stats = self.tasks.stats();
        if stats.failed > 0 {
            return Err(DaemonError::JobFailed(format!(
                "{} of {} jobs failed; see the log for details",
                stats.failed, stats.submitted
            )));
        }
        Ok(())
    }
}

/// Wait for Ctrl-C or, on unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
