//! Periodic job submission
//!
//! Each registration gets its own timer task, so a registration stuck waiting
//! on a full queue never delays the ticks of another one.

use crate::job::BoxedJob;
use crate::processor::{Processor, ProcessorError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Builds a fresh job instance for every tick
pub type JobFactory = Arc<dyn Fn() -> BoxedJob + Send + Sync>;

#[derive(Debug, Error)]
pub enum CronError {
    #[error("No periodic job registered as {0}")]
    UnknownJob(String),

    #[error("Interval for {0} must be greater than zero")]
    InvalidInterval(String),

    #[error(transparent)]
    Processor(#[from] ProcessorError),
}

#[derive(Clone)]
struct Registration {
    name: String,
    interval: Duration,
    factory: JobFactory,
}

/// Submits jobs to a [`Processor`] on fixed intervals
pub struct CronScheduler {
    processor: Arc<Processor>,
    registrations: Mutex<Vec<Registration>>,
    timers: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
}

impl CronScheduler {
    pub fn new(processor: Arc<Processor>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            processor,
            registrations: Mutex::new(Vec::new()),
            timers: Mutex::new(Vec::new()),
            shutdown_tx,
            started: AtomicBool::new(false),
        }
    }

    /// Register a periodic job. The first tick fires one interval after start.
    pub async fn register_job<F>(
        &self,
        name: impl Into<String>,
        interval: Duration,
        factory: F,
    ) -> Result<(), CronError>
    where
        F: Fn() -> BoxedJob + Send + Sync + 'static,
    {
        let name = name.into();
        if interval.is_zero() {
            return Err(CronError::InvalidInterval(name));
        }

        let registration = Registration {
            name,
            interval,
            factory: Arc::new(factory),
        };

        tracing::info!(
            job = %registration.name,
            interval_secs = registration.interval.as_secs_f64(),
            "Registered periodic job"
        );

        if self.started.load(Ordering::SeqCst) {
            self.timers.lock().await.push(self.spawn_timer(registration.clone()));
        }
        self.registrations.lock().await.push(registration);
        Ok(())
    }

    /// Arm every registered timer
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let registrations = self.registrations.lock().await.clone();
        let mut timers = self.timers.lock().await;
        for registration in registrations {
            timers.push(self.spawn_timer(registration));
        }

        tracing::info!(timers = timers.len(), "Cron scheduler started");
    }

    /// Submit the named job once, right now
    pub async fn trigger(&self, name: &str) -> Result<(), CronError> {
        let factory = self
            .registrations
            .lock()
            .await
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.factory.clone())
            .ok_or_else(|| CronError::UnknownJob(name.to_string()))?;

        tracing::info!(job = %name, "Manually triggered periodic job");
        self.processor.submit(factory()).await?;
        Ok(())
    }

    /// Names of all registrations
    pub async fn job_names(&self) -> Vec<String> {
        self.registrations
            .lock()
            .await
            .iter()
            .map(|r| r.name.clone())
            .collect()
    }

    /// Cancel every timer and wait for the timer tasks to exit
    pub async fn close(&self) {
        let _ = self.shutdown_tx.send(true);

        let timers = std::mem::take(&mut *self.timers.lock().await);
        for timer in timers {
            if let Err(e) = timer.await {
                tracing::error!(error = %e, "Cron timer task aborted");
            }
        }

        tracing::info!("Cron scheduler stopped");
    }

    fn spawn_timer(&self, registration: Registration) -> JoinHandle<()> {
        let processor = self.processor.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval_at(
                Instant::now() + registration.interval,
                registration.interval,
            );
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }

                let job = (registration.factory)();
                tokio::select! {
                    result = processor.submit(job) => {
                        if let Err(e) = result {
                            tracing::warn!(job = %registration.name, error = %e, "Periodic submission rejected");
                            break;
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            tracing::debug!(job = %registration.name, "Cron timer exited");
        })
    }
}
