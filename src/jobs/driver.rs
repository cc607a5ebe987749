use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, sleep};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::jobs::executor::{ExecuteError, JobExecutor};
use crate::jobs::scheduler::JobScheduler;
use crate::store::{JobStore, QueueStore, StoreError};

#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// How often the driver looks for due jobs.
    pub interval: Duration,
    /// Delay before the first check, so dependent services can come up.
    pub startup_grace: Duration,
    /// Fixed number of worker tasks executing due jobs.
    pub worker_count: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            startup_grace: Duration::from_secs(10),
            worker_count: 4,
        }
    }
}

/// Periodic loop that finds due jobs and hands them to a fixed worker
/// pool over a bounded channel.
///
/// The bounded channel is the backpressure: when every worker is busy
/// and the channel is full, dispatch waits instead of spawning
/// unbounded executions. One job's failure is isolated to its worker
/// iteration and never stops the loop. Shutdown is advisory: the
/// driver stops dispatching and the workers drain, but executions
/// already in flight finish their current item.
pub struct BackgroundDriver {
    jobs: Arc<dyn JobStore>,
    queue: Arc<dyn QueueStore>,
    scheduler: Arc<JobScheduler>,
    executor: Arc<JobExecutor>,
    config: DriverConfig,
    cancel: CancellationToken,
}

impl BackgroundDriver {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        queue: Arc<dyn QueueStore>,
        scheduler: Arc<JobScheduler>,
        executor: Arc<JobExecutor>,
        config: DriverConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            jobs,
            queue,
            scheduler,
            executor,
            config,
            cancel,
        }
    }

    /// Run until cancelled. Intended to be spawned alongside the API.
    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            workers = self.config.worker_count,
            "background driver started"
        );

        tokio::select! {
            _ = sleep(self.config.startup_grace) => {}
            _ = self.cancel.cancelled() => {
                tracing::info!("background driver stopped before first check");
                return;
            }
        }

        let worker_count = self.config.worker_count.max(1);
        let (tx, rx) = mpsc::channel::<Uuid>(worker_count * 2);
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            workers.push(tokio::spawn(run_worker(
                worker_id,
                Arc::clone(&rx),
                Arc::clone(&self.executor),
                Arc::clone(&self.scheduler),
                self.cancel.clone(),
            )));
        }

        let mut tick = interval(self.config.interval);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tick.tick() => {
                    if let Err(err) = self.dispatch_due(&tx).await {
                        tracing::error!(error = %err, "error while dispatching due jobs");
                    }
                }
            }
        }

        // Closing the channel lets the workers drain and exit;
        // in-flight executions are not forcibly cancelled.
        drop(tx);
        for worker in workers {
            let _ = worker.await;
        }

        tracing::info!("background driver stopped");
    }

    async fn dispatch_due(&self, tx: &mpsc::Sender<Uuid>) -> Result<(), StoreError> {
        // Give failed items with remaining budget another chance
        // before this round of scheduling.
        match self.queue.reopen_failed().await {
            Ok(0) => {}
            Ok(reopened) => tracing::info!(reopened, "re-opened failed queue items for retry"),
            Err(err) => tracing::error!(error = %err, "failed-item sweep errored"),
        }

        if let Ok(depth) = self.queue.queue_length().await {
            metrics::gauge!("pricewatch_queue_depth").set(depth as f64);
        }

        let jobs = self.jobs.list_schedulable_jobs().await?;
        tracing::debug!(count = jobs.len(), "checking active jobs for due execution");

        for job in jobs {
            if self.cancel.is_cancelled() {
                break;
            }

            if JobScheduler::is_due(&job) {
                // Blocks when all workers are busy and the channel is
                // full; send only fails once the driver is shutting down.
                if tx.send(job.id).await.is_err() {
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn run_worker(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Uuid>>>,
    executor: Arc<JobExecutor>,
    scheduler: Arc<JobScheduler>,
    cancel: CancellationToken,
) {
    loop {
        let job_id = {
            let mut receiver = rx.lock().await;
            receiver.recv().await
        };

        let Some(job_id) = job_id else {
            break;
        };

        match executor.execute_job(job_id, &cancel).await {
            Ok(_) => {
                if let Err(err) = scheduler.mark_ran_and_reschedule(job_id).await {
                    tracing::error!(worker_id, %job_id, error = %err, "failed to reschedule job");
                }
            }
            Err(ExecuteError::AlreadyRunning(_)) => {
                tracing::debug!(worker_id, %job_id, "job already running, skipping");
            }
            Err(err) => {
                tracing::error!(worker_id, %job_id, error = %err, "job execution errored");
            }
        }
    }

    tracing::debug!(worker_id, "worker stopped");
}
