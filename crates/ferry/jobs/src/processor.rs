//! Fixed-size worker pool draining a bounded job queue

use crate::job::{BoxedJob, JobListener, JobOutcome, JobRecord};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Processor sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Number of worker loops
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Jobs that may wait in the queue before `submit` starts waiting
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    256
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProcessorError {
    /// The processor was closed and accepts no more jobs
    #[error("Processor {0} is closed")]
    Closed(String),
}

/// Counters since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessorStats {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Bounded job queue with a fixed pool of workers.
///
/// `submit` waits while the queue is full. `close` stops intake, lets the
/// workers drain everything already queued, and returns once they exit.
/// Failed jobs are logged and recorded but never retried.
pub struct Processor {
    name: Arc<str>,
    config: ProcessorConfig,
    sender: Mutex<Option<mpsc::Sender<BoxedJob>>>,
    receiver: Arc<Mutex<mpsc::Receiver<BoxedJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    listener: Option<Arc<dyn JobListener>>,
    counters: Arc<Counters>,
    started: AtomicBool,
}

impl Processor {
    pub fn new(name: impl Into<String>, config: ProcessorConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let name: String = name.into();
        Self {
            name: name.into(),
            config,
            sender: Mutex::new(Some(sender)),
            receiver: Arc::new(Mutex::new(receiver)),
            workers: Mutex::new(Vec::new()),
            listener: None,
            counters: Arc::new(Counters::default()),
            started: AtomicBool::new(false),
        }
    }

    /// Attach a listener notified after every execution
    pub fn with_listener(mut self, listener: Arc<dyn JobListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> ProcessorStats {
        ProcessorStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Enqueue a job, waiting for space if the queue is full
    pub async fn submit(&self, job: BoxedJob) -> Result<(), ProcessorError> {
        let sender = self
            .sender
            .lock()
            .await
            .clone()
            .ok_or_else(|| ProcessorError::Closed(self.name.to_string()))?;

        let job_type = job.job_type();
        let job_id = job.id();

        sender
            .send(job)
            .await
            .map_err(|_| ProcessorError::Closed(self.name.to_string()))?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(processor = %self.name, job_type, job_id = %job_id, "Job queued");
        Ok(())
    }

    /// Launch the worker loops. Calling it twice is a no-op.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!(processor = %self.name, "Processor already started");
            return;
        }

        let mut workers = self.workers.lock().await;
        for worker in 0..self.config.workers.max(1) {
            let receiver = self.receiver.clone();
            let listener = self.listener.clone();
            let counters = self.counters.clone();
            let name = self.name.clone();
            workers.push(tokio::spawn(async move {
                worker_loop(worker, name, receiver, listener, counters).await;
            }));
        }

        tracing::info!(
            processor = %self.name,
            workers = self.config.workers.max(1),
            queue_capacity = self.config.queue_capacity,
            "Processor started"
        );
    }

    /// Stop intake, drain the queue and wait for in-flight jobs
    pub async fn close(&self) {
        let sender = self.sender.lock().await.take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let handles = std::mem::take(&mut *self.workers.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(processor = %self.name, error = %e, "Worker task aborted");
            }
        }

        tracing::info!(processor = %self.name, stats = ?self.stats(), "Processor stopped");
    }
}

async fn worker_loop(
    worker: usize,
    name: Arc<str>,
    receiver: Arc<Mutex<mpsc::Receiver<BoxedJob>>>,
    listener: Option<Arc<dyn JobListener>>,
    counters: Arc<Counters>,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(job) = next else {
            break;
        };
        run_job(job, listener.as_deref(), &counters)
            .instrument(tracing::info_span!("worker", processor = %name, worker))
            .await;
    }
    tracing::debug!(processor = %name, worker, "Worker exited");
}

async fn run_job(job: BoxedJob, listener: Option<&dyn JobListener>, counters: &Counters) {
    let job_type = job.job_type();
    let job_id = job.id();
    let started_at = chrono::Utc::now();

    let result = AssertUnwindSafe(job.execute())
        .catch_unwind()
        .instrument(tracing::info_span!("job", job_type, job_id = %job_id))
        .await;

    let outcome = match result {
        Ok(Ok(())) => {
            counters.succeeded.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(job_type, job_id = %job_id, "Job completed");
            JobOutcome::Succeeded
        }
        Ok(Err(e)) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            let message = format!("{:#}", e);
            tracing::error!(job_type, job_id = %job_id, error = %message, "Job failed");
            JobOutcome::Failed(message)
        }
        Err(panic) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            let message = panic_message(panic.as_ref());
            tracing::error!(job_type, job_id = %job_id, panic = %message, "Job panicked");
            JobOutcome::Panicked(message)
        }
    };

    if let Some(listener) = listener {
        let record = JobRecord {
            job_type: job_type.to_string(),
            job_id,
            started_at,
            finished_at: chrono::Utc::now(),
            outcome,
        };
        listener.on_finished(&record).await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Barrier;

    struct CountJob {
        id: String,
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Job for CountJob {
        fn job_type(&self) -> &'static str {
            "test.count"
        }

        fn id(&self) -> String {
            self.id.clone()
        }

        async fn execute(&self) -> anyhow::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailJob;

    #[async_trait]
    impl Job for FailJob {
        fn job_type(&self) -> &'static str {
            "test.fail"
        }

        fn id(&self) -> String {
            "fail".to_string()
        }

        async fn execute(&self) -> anyhow::Result<()> {
            anyhow::bail!("boom")
        }
    }

    struct PanicJob;

    #[async_trait]
    impl Job for PanicJob {
        fn job_type(&self) -> &'static str {
            "test.panic"
        }

        fn id(&self) -> String {
            "panic".to_string()
        }

        async fn execute(&self) -> anyhow::Result<()> {
            panic!("worker should survive this")
        }
    }

    struct BarrierJob(Arc<Barrier>);

    #[async_trait]
    impl Job for BarrierJob {
        fn job_type(&self) -> &'static str {
            "test.barrier"
        }

        fn id(&self) -> String {
            "same-id".to_string()
        }

        async fn execute(&self) -> anyhow::Result<()> {
            self.0.wait().await;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        records: std::sync::Mutex<Vec<JobRecord>>,
    }

    #[async_trait]
    impl JobListener for RecordingListener {
        async fn on_finished(&self, record: &JobRecord) {
            self.records.lock().unwrap().push(record.clone());
        }
    }

    fn count_job(count: &Arc<AtomicUsize>) -> BoxedJob {
        Box::new(CountJob {
            id: "c".to_string(),
            count: count.clone(),
        })
    }

    fn config(workers: usize, queue_capacity: usize) -> ProcessorConfig {
        ProcessorConfig {
            workers,
            queue_capacity,
        }
    }

    #[tokio::test]
    async fn test_executes_all_submitted_jobs() {
        let processor = Processor::new("test", config(3, 16));
        let count = Arc::new(AtomicUsize::new(0));
        processor.start().await;

        for _ in 0..10 {
            processor.submit(count_job(&count)).await.unwrap();
        }
        processor.close().await;

        assert_eq!(count.load(Ordering::SeqCst), 10);
        let stats = processor.stats();
        assert_eq!(stats.submitted, 10);
        assert_eq!(stats.succeeded, 10);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_close_drains_jobs_queued_before_start() {
        let processor = Processor::new("test", config(1, 8));
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            processor.submit(count_job(&count)).await.unwrap();
        }
        processor.start().await;
        processor.close().await;
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_failures_and_panics_do_not_stop_worker() {
        let listener = Arc::new(RecordingListener::default());
        let processor = Processor::new("test", config(1, 8)).with_listener(listener.clone());
        let count = Arc::new(AtomicUsize::new(0));
        processor.start().await;

        processor.submit(Box::new(FailJob)).await.unwrap();
        processor.submit(Box::new(PanicJob)).await.unwrap();
        processor.submit(count_job(&count)).await.unwrap();
        processor.close().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(processor.stats().failed, 2);

        let records = listener.records.lock().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].outcome, JobOutcome::Failed("boom".to_string()));
        assert!(matches!(records[1].outcome, JobOutcome::Panicked(ref m) if m.contains("survive")));
        assert!(records[2].outcome.is_success());
        assert_eq!(records[2].job_type, "test.count");
    }

    #[tokio::test]
    async fn test_submit_after_close_is_rejected() {
        let processor = Processor::new("test", config(1, 1));
        processor.start().await;
        processor.close().await;

        let count = Arc::new(AtomicUsize::new(0));
        let err = processor.submit(count_job(&count)).await.unwrap_err();
        assert_eq!(err, ProcessorError::Closed("test".to_string()));
    }

    #[tokio::test]
    async fn test_full_queue_applies_backpressure() {
        let processor = Arc::new(Processor::new("test", config(1, 1)));
        let count = Arc::new(AtomicUsize::new(0));

        processor.submit(count_job(&count)).await.unwrap();
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), processor.submit(count_job(&count)))
                .await;
        assert!(blocked.is_err(), "second submit should wait for space");

        let waiting = {
            let processor = processor.clone();
            let count = count.clone();
            tokio::spawn(async move { processor.submit(count_job(&count)).await })
        };
        processor.start().await;
        waiting.await.unwrap().unwrap();
        processor.close().await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_jobs_with_same_id_run_concurrently() {
        let processor = Processor::new("test", config(2, 4));
        let barrier = Arc::new(Barrier::new(2));
        processor.start().await;

        processor
            .submit(Box::new(BarrierJob(barrier.clone())))
            .await
            .unwrap();
        processor
            .submit(Box::new(BarrierJob(barrier.clone())))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), processor.close())
            .await
            .expect("both jobs must be in flight at the same time");
        assert_eq!(processor.stats().succeeded, 2);
    }
}
