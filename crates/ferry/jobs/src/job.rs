//! The unit of work executed by a [`Processor`](crate::Processor)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named, identifiable action.
///
/// Jobs carry identifiers only and read whatever state they need when they
/// run. A job is executed at most once per submission and then dropped.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Discriminator, e.g. `workload.deploy`
    fn job_type(&self) -> &'static str;

    /// Correlation key. Not unique: jobs sharing an id may run concurrently.
    fn id(&self) -> String;

    /// Perform the work
    async fn execute(&self) -> anyhow::Result<()>;
}

pub type BoxedJob = Box<dyn Job>;

/// How a single execution ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded,
    Failed(String),
    Panicked(String),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }
}

/// Audit record produced after every execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_type: String,
    pub job_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: JobOutcome,
}

/// Receives a [`JobRecord`] once a job has finished
#[async_trait]
pub trait JobListener: Send + Sync {
    async fn on_finished(&self, record: &JobRecord);
}
