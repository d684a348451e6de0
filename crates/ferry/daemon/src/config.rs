//! Configuration for ferryd

use ferry_control::{PlatformSettings, VerificationSettings};
use ferry_jobs::ProcessorConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Task processor sizing
    #[serde(default)]
    pub processor: ProcessorConfig,

    /// Verification processor sizing and retry budget
    #[serde(default)]
    pub verification: VerificationConfig,

    /// Periodic jobs
    #[serde(default)]
    pub cron: CronConfig,

    /// Namespaces, domains and issuers
    #[serde(default)]
    pub platform: PlatformSettings,

    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub dns: DnsConfig,

    #[serde(default)]
    pub data_plane: DataPlaneConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Verification runs get their own processor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    #[serde(default = "default_verification_workers")]
    pub workers: usize,

    #[serde(default = "default_verification_queue")]
    pub queue_capacity: usize,

    /// Wait before each DNS attempt
    #[serde(default = "default_verification_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_verification_attempts")]
    pub max_attempts: u32,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            workers: default_verification_workers(),
            queue_capacity: default_verification_queue(),
            interval_secs: default_verification_interval(),
            max_attempts: default_verification_attempts(),
        }
    }
}

impl VerificationConfig {
    pub fn processor(&self) -> ProcessorConfig {
        ProcessorConfig {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
        }
    }

    pub fn settings(&self) -> VerificationSettings {
        VerificationSettings {
            interval_secs: self.interval_secs,
            max_attempts: self.max_attempts,
        }
    }
}

/// Periodic job intervals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronConfig {
    #[serde(default = "default_audit_interval")]
    pub audit_interval_secs: u64,

    #[serde(default = "default_domain_check_interval")]
    pub domain_check_interval_secs: u64,

    /// Age after which a pending claim is considered abandoned
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            audit_interval_secs: default_audit_interval(),
            domain_check_interval_secs: default_domain_check_interval(),
            stale_after_secs: default_stale_after(),
        }
    }
}

impl CronConfig {
    pub fn audit_interval(&self) -> Duration {
        Duration::from_secs(self.audit_interval_secs)
    }

    pub fn domain_check_interval(&self) -> Duration {
        Duration::from_secs(self.domain_check_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Cluster backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClusterConfig {
    /// In-memory cluster (for development/testing)
    #[default]
    Memory,

    /// Kubernetes API server
    Kubernetes {
        /// API server URL; derived from the pod environment when absent
        #[serde(default)]
        api_url: Option<String>,

        /// Bearer token; ignored when `in_cluster` is set
        #[serde(default)]
        token: Option<String>,

        /// Use the mounted service account
        #[serde(default)]
        in_cluster: bool,

        /// Token file overriding the service account default
        #[serde(default)]
        token_path: Option<String>,

        #[serde(default)]
        accept_invalid_certs: bool,
    },
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    /// PostgreSQL storage
    Postgres {
        /// Connection URL
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

/// DNS resolver
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DnsConfig {
    /// Fixed, initially empty tables; nothing ever verifies
    #[default]
    Static,

    /// DNS-over-HTTPS JSON API
    Doh {
        #[serde(default = "default_doh_endpoint")]
        endpoint: String,
    },
}

/// Tenant database backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DataPlaneConfig {
    #[default]
    Memory,

    /// PostgreSQL-compatible server reached with an admin DSN
    Sql {
        admin_url: String,

        /// Host handed to tenants
        host: String,

        #[serde(default = "default_sql_port")]
        port: u16,
    },
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_verification_workers() -> usize {
    8
}

fn default_verification_queue() -> usize {
    64
}

fn default_verification_interval() -> u64 {
    5
}

fn default_verification_attempts() -> u32 {
    12
}

fn default_audit_interval() -> u64 {
    60
}

fn default_domain_check_interval() -> u64 {
    60
}

fn default_stale_after() -> u64 {
    300
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_doh_endpoint() -> String {
    "https://cloudflare-dns.com/dns-query".to_string()
}

fn default_sql_port() -> u16 {
    5432
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Defaults, then the optional file, then `FERRY_`-prefixed environment
    /// variables with `__` between nesting levels
    /// (e.g. `FERRY_STORAGE__TYPE=postgres`)
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("FERRY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings under which the stale-claim sweep could overtake a
    /// verification run that is still in progress
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let run = self.verification.settings().run_duration();
        if self.cron.stale_after() <= run {
            return Err(config::ConfigError::Message(format!(
                "cron.stale_after_secs ({}) must exceed verification.interval_secs x max_attempts ({})",
                self.cron.stale_after_secs,
                run.as_secs()
            )));
        }
        if self.verification.max_attempts == 0 {
            return Err(config::ConfigError::Message(
                "verification.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.processor.workers, 4);
        assert!(matches!(config.cluster, ClusterConfig::Memory));
        assert!(matches!(config.storage, StorageConfig::Memory));
        assert!(matches!(config.dns, DnsConfig::Static));
        assert_eq!(config.platform.workload_namespace, "ferry-workloads");
    }

    #[test]
    fn test_verification_defaults() {
        let config = VerificationConfig::default();
        assert_eq!(config.settings(), VerificationSettings::default());
        assert_eq!(config.processor().workers, 8);
    }

    #[test]
    fn test_cron_defaults() {
        let config = CronConfig::default();
        assert_eq!(config.audit_interval(), Duration::from_secs(60));
        assert_eq!(config.stale_after(), Duration::from_secs(300));
    }

    #[test]
    fn test_load_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("ferryd-config-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
[processor]
workers = 2

[verification]
max_attempts = 3

[platform]
workload_domain = "apps.example.com"

[storage]
type = "postgres"
url = "postgres://ferry@localhost/ferry"

[dns]
type = "doh"
"#,
        )
        .unwrap();

        let config = DaemonConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.processor.workers, 2);
        assert_eq!(config.processor.queue_capacity, 256);
        assert_eq!(config.verification.max_attempts, 3);
        assert_eq!(config.verification.interval_secs, 5);
        assert_eq!(config.platform.workload_domain, "apps.example.com");
        assert_eq!(config.platform.system_namespace, "ferry-system");
        match config.storage {
            StorageConfig::Postgres {
                url,
                max_connections,
                ..
            } => {
                assert_eq!(url, "postgres://ferry@localhost/ferry");
                assert_eq!(max_connections, 10);
            }
            other => panic!("unexpected storage {other:?}"),
        }
        assert!(matches!(config.dns, DnsConfig::Doh { endpoint } if endpoint.contains("dns-query")));
    }

    #[test]
    fn test_load_without_file() {
        let config = DaemonConfig::load(None).unwrap();
        assert_eq!(config.cron.domain_check_interval_secs, 60);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_rejects_short_stale_after() {
        assert!(DaemonConfig::default().validate().is_ok());

        let mut config = DaemonConfig::default();
        config.cron.stale_after_secs = 60;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stale_after_secs"));

        let mut config = DaemonConfig::default();
        config.verification.interval_secs = 30;
        assert!(config.validate().is_err());
        config.cron.stale_after_secs = 361;
        assert!(config.validate().is_ok());

        let mut config = DaemonConfig::default();
        config.verification.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
