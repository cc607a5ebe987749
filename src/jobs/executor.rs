use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::job::{Job, JobStatus};
use crate::models::product::{PriceChange, PricePoint, Product, ProductSnapshot};
use crate::models::queue::QueueItem;
use crate::scraping::orchestrator::Orchestrator;
use crate::store::{JobStore, ProductStore, QueueStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job {0} is already running")]
    AlreadyRunning(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Aggregated outcome of one job execution.
#[derive(Debug, Default)]
pub struct JobRunSummary {
    pub status: Option<JobStatus>,
    pub processed: i32,
    pub failed: i32,
    pub errors: Vec<String>,
    pub price_changes: Vec<PriceChange>,
    pub duration: Duration,
}

/// Drives one job run end to end: claims the job, drains its pending
/// queue items through the orchestrator, persists product and price
/// data, and records the run on the job.
///
/// Item-level scrape failures are absorbed into the item's `failed`
/// state and the job's failure counter; only persistence errors abort
/// the run and mark the whole job `Failed`. Nothing escapes
/// `execute_job` once the job has been claimed.
pub struct JobExecutor {
    jobs: Arc<dyn JobStore>,
    queue: Arc<dyn QueueStore>,
    products: Arc<dyn ProductStore>,
    orchestrator: Arc<Orchestrator>,
    price_events: broadcast::Sender<PriceChange>,
    batch_size: usize,
}

impl JobExecutor {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        queue: Arc<dyn QueueStore>,
        products: Arc<dyn ProductStore>,
        orchestrator: Arc<Orchestrator>,
        price_events: broadcast::Sender<PriceChange>,
        batch_size: usize,
    ) -> Self {
        Self {
            jobs,
            queue,
            products,
            orchestrator,
            price_events,
            batch_size,
        }
    }

    /// Execute every pending queue item belonging to the job.
    ///
    /// Errors are only returned for the pre-run conditions (unknown
    /// job, job already running); from the moment the job is claimed
    /// the outcome is reported through the summary and the job row.
    pub async fn execute_job(
        &self,
        job_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<JobRunSummary, ExecuteError> {
        let Some(job) = self.jobs.try_begin_run(job_id).await? else {
            return match self.jobs.get_job(job_id).await? {
                None => Err(ExecuteError::NotFound(job_id)),
                Some(_) => Err(ExecuteError::AlreadyRunning(job_id)),
            };
        };

        tracing::info!(%job_id, name = %job.name, "starting job execution");

        let started = Instant::now();
        let mut summary = JobRunSummary::default();
        let run_result = self.drain_queue(&job, cancel, &mut summary).await;
        summary.duration = started.elapsed();

        self.finalize(job, run_result, &mut summary).await;

        Ok(summary)
    }

    /// Single-URL variant used by ad-hoc triggers: claim the pending
    /// item for this URL, scrape it and persist the outcome.
    pub async fn execute_url(
        &self,
        url: &str,
        job_id: Uuid,
    ) -> Result<JobRunSummary, ExecuteError> {
        let mut summary = JobRunSummary::default();

        let Some(item) = self.queue.find_pending_by_url(job_id, url).await? else {
            tracing::warn!(url, %job_id, "no pending queue item for URL");
            return Ok(summary);
        };

        self.queue.mark_in_progress(item.id).await?;
        self.process_item(&item, &mut summary).await?;

        Ok(summary)
    }

    async fn drain_queue(
        &self,
        job: &Job,
        cancel: &CancellationToken,
        summary: &mut JobRunSummary,
    ) -> Result<(), StoreError> {
        let batch = self.queue.dequeue_batch(Some(job.id), self.batch_size).await?;
        tracing::info!(%job.id, name = %job.name, count = batch.len(), "processing queue items");

        let mut remaining: VecDeque<QueueItem> = batch.into();

        while let Some(item) = remaining.pop_front() {
            if cancel.is_cancelled() {
                tracing::warn!(%job.id, name = %job.name, "job execution cancelled");
                self.release_all(item, &mut remaining).await;
                break;
            }

            if let Err(err) = self.process_item(&item, summary).await {
                // Persistence failure aborts the run; put the batch
                // back so the next run can pick it up.
                self.release_all(item, &mut remaining).await;
                return Err(err);
            }
        }

        Ok(())
    }

    /// Scrape one claimed item and record its outcome. Returns an
    /// error only when persistence fails.
    async fn process_item(
        &self,
        item: &QueueItem,
        summary: &mut JobRunSummary,
    ) -> Result<(), StoreError> {
        let outcome = self.orchestrator.scrape_one(&item.url).await;

        match (outcome.success, &outcome.snapshot) {
            (true, Some(snapshot)) => {
                let change = self.save_snapshot(snapshot, &item.url).await?;

                let payload = serde_json::to_value(&outcome).unwrap_or_default();
                self.queue.mark_completed(item.id, payload).await?;
                summary.processed += 1;

                metrics::counter!("pricewatch_items_completed_total").increment(1);

                if let Some(change) = change {
                    tracing::info!(
                        url = %item.url,
                        product = %change.product_name,
                        old_price = ?change.old_price,
                        new_price = change.new_price,
                        "price change recorded"
                    );
                    metrics::counter!("pricewatch_price_changes_total").increment(1);
                    let _ = self.price_events.send(change.clone());
                    summary.price_changes.push(change);
                }
            }
            _ => {
                let error = outcome
                    .error
                    .as_deref()
                    .unwrap_or("unknown error")
                    .to_string();

                self.queue.mark_failed(item.id, &error).await?;
                summary.failed += 1;
                summary.errors.push(format!("{}: {}", item.url, error));

                metrics::counter!("pricewatch_items_failed_total").increment(1);
                tracing::warn!(url = %item.url, error = %error, "queue item failed");
            }
        }

        Ok(())
    }

    /// Insert or update the product for this URL, appending a price
    /// point only when the observed price differs from the latest
    /// recorded one. Returns the price-change fact when one occurred.
    async fn save_snapshot(
        &self,
        snapshot: &ProductSnapshot,
        url: &str,
    ) -> Result<Option<PriceChange>, StoreError> {
        let now = Utc::now();

        match self.products.find_product_by_url(url).await? {
            Some(mut product) => {
                product.name = snapshot.title.clone();
                product.current_price = snapshot.price;
                product.is_available = snapshot.is_available;
                if snapshot.image_url.is_some() {
                    product.image_url = snapshot.image_url.clone();
                }
                if snapshot.sku.is_some() {
                    product.sku = snapshot.sku.clone();
                }
                product.last_updated = now;

                self.products.update_product(&product).await?;

                let latest = self.products.latest_price(product.id).await?;
                let old_price = latest.as_ref().map(|p| p.price);
                if old_price != Some(snapshot.price) {
                    self.products
                        .append_price(&PricePoint {
                            id: Uuid::new_v4(),
                            product_id: product.id,
                            price: snapshot.price,
                            recorded_at: now,
                        })
                        .await?;

                    return Ok(Some(PriceChange {
                        product_id: product.id,
                        product_name: product.name,
                        url: url.to_string(),
                        old_price,
                        new_price: snapshot.price,
                        observed_at: now,
                    }));
                }

                Ok(None)
            }
            None => {
                let product = Product {
                    id: Uuid::new_v4(),
                    name: snapshot.title.clone(),
                    url: url.to_string(),
                    image_url: snapshot.image_url.clone(),
                    sku: snapshot.sku.clone(),
                    current_price: snapshot.price,
                    is_available: snapshot.is_available,
                    last_updated: now,
                    created_at: now,
                };

                self.products.insert_product(&product).await?;
                self.products
                    .append_price(&PricePoint {
                        id: Uuid::new_v4(),
                        product_id: product.id,
                        price: snapshot.price,
                        recorded_at: now,
                    })
                    .await?;

                tracing::info!(url, name = %product.name, "created new product");

                Ok(Some(PriceChange {
                    product_id: product.id,
                    product_name: product.name,
                    url: url.to_string(),
                    old_price: None,
                    new_price: snapshot.price,
                    observed_at: now,
                }))
            }
        }
    }

    async fn release_all(&self, first: QueueItem, rest: &mut VecDeque<QueueItem>) {
        for item in std::iter::once(first).chain(rest.drain(..)) {
            if let Err(err) = self.queue.release(item.id).await {
                tracing::error!(item_id = %item.id, error = %err, "failed to release queue item");
            }
        }
    }

    /// Exactly one job-status write per execution, whatever happened.
    async fn finalize(
        &self,
        mut job: Job,
        run_result: Result<(), StoreError>,
        summary: &mut JobRunSummary,
    ) {
        let now = Utc::now();

        match run_result {
            Ok(()) => {
                job.status = JobStatus::Completed;
                job.success_count += summary.processed;
                job.failure_count += summary.failed;
                job.products_scraped = summary.processed;
                job.error_message = if summary.failed > 0 {
                    let sample: Vec<&str> =
                        summary.errors.iter().take(3).map(String::as_str).collect();
                    Some(format!("{} items failed. Errors: {}", summary.failed, sample.join(", ")))
                } else {
                    None
                };

                tracing::info!(
                    %job.id,
                    name = %job.name,
                    processed = summary.processed,
                    failed = summary.failed,
                    duration_ms = summary.duration.as_millis() as u64,
                    "job completed"
                );
            }
            Err(err) => {
                job.status = JobStatus::Failed;
                job.error_message = Some(err.to_string());

                tracing::error!(%job.id, name = %job.name, error = %err, "job execution failed");
            }
        }

        job.completed_at = Some(now);
        job.last_duration_ms = Some(summary.duration.as_millis() as i64);
        summary.status = Some(job.status);

        metrics::counter!("pricewatch_jobs_executed_total").increment(1);

        if let Err(err) = self.jobs.update_job(&job).await {
            tracing::error!(%job.id, error = %err, "failed to record job outcome");
        }
    }
}
