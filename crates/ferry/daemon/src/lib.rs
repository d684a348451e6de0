//! Ferry daemon library
//!
//! Wires the control-plane components into one process:
//! - configuration loading
//! - backend selection (cluster, storage, DNS, data plane)
//! - the task and verification processors and the cron scheduler

pub mod config;
pub mod error;
pub mod server;

pub use config::DaemonConfig;
pub use error::{DaemonError, DaemonResult};
pub use server::{Backends, Daemon};
