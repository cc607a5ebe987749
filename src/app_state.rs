use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::jobs::executor::JobExecutor;
use crate::jobs::scheduler::JobScheduler;
use crate::scraping::orchestrator::Orchestrator;
use crate::store::{JobStore, QueueStore};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobStore>,
    pub queue: Arc<dyn QueueStore>,
    pub scheduler: Arc<JobScheduler>,
    pub executor: Arc<JobExecutor>,
    pub orchestrator: Arc<Orchestrator>,
    /// Process-wide shutdown signal, propagated into spawned
    /// executions. Advisory: in-flight items are not aborted.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        queue: Arc<dyn QueueStore>,
        scheduler: Arc<JobScheduler>,
        executor: Arc<JobExecutor>,
        orchestrator: Arc<Orchestrator>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            jobs,
            queue,
            scheduler,
            executor,
            orchestrator,
            shutdown,
        }
    }
}
