//! Ferry Jobs - asynchronous job execution engine
//!
//! - [`Processor`]: bounded queue drained by a fixed pool of workers
//! - [`CronScheduler`]: timers that feed fresh jobs into a processor
//!
//! The engine knows nothing about workloads or domains; it runs anything
//! implementing [`Job`].

pub mod cron;
pub mod job;
pub mod processor;

pub use cron::{CronError, CronScheduler, JobFactory};
pub use job::{BoxedJob, Job, JobListener, JobOutcome, JobRecord};
pub use processor::{Processor, ProcessorConfig, ProcessorError, ProcessorStats};
