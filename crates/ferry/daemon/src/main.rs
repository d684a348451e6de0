//! Ferry Daemon - control-plane job processing
//!
//! ferryd provides:
//! - Task and verification processors
//! - Periodic workload audit and stale-claim checks
//! - One-shot execution of a periodic job or a task from the command line

use clap::{Parser, Subcommand};
use ferry_daemon::{Daemon, DaemonConfig, DaemonError, DaemonResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Ferry Daemon CLI
#[derive(Parser)]
#[command(name = "ferryd")]
#[command(about = "Ferry Daemon - control-plane job processing", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "FERRY_CONFIG")]
    config: Option<String>,

    /// Log level, overriding the configuration
    #[arg(long, env = "FERRY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "FERRY_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run until interrupted (default)
    Serve,

    /// Run one registered periodic job once and exit
    Trigger {
        /// e.g. cron.audit_workloads
        name: String,
    },

    /// Build one task from a JSON payload, run it and exit
    Submit {
        /// e.g. workload.deploy
        task_type: String,

        /// e.g. '{"workload_id":"abc123","owner_id":"u1"}'
        payload: String,
    },
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    let config = DaemonConfig::load(cli.config.as_deref())?;

    // Initialize tracing
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        workload_namespace = %config.platform.workload_namespace,
        "Starting ferryd"
    );

    let daemon = Daemon::new(&config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => daemon.run().await,
        Command::Trigger { name } => {
            daemon.trigger_once(&name).await?;
            tracing::info!(job = %name, "Periodic job finished");
            Ok(())
        }
        Command::Submit { task_type, payload } => {
            let payload: serde_json::Value = serde_json::from_str(&payload)
                .map_err(|e| DaemonError::Config(format!("Invalid payload: {e}")))?;
            let job_id = daemon.submit_once(&task_type, payload).await?;
            tracing::info!(task_type = %task_type, job_id = %job_id, "Task finished");
            Ok(())
        }
    }
}
