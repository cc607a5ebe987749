//! In-memory store for tests and simple single-process use.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::job::{Job, JobStatus};
use crate::models::product::{PricePoint, Product};
use crate::models::queue::{QueueItem, QueueItemStatus};
use crate::store::{JobStore, ProductStore, QueueStore, StoreError};

#[derive(Default)]
struct MemoryState {
    jobs: HashMap<Uuid, Job>,
    items: HashMap<Uuid, QueueItem>,
    products: HashMap<Uuid, Product>,
    prices: Vec<PricePoint>,
}

/// All collections behind one lock, so the claim transitions the
/// Postgres store gets from conditional UPDATEs hold here too.
///
/// Cloning creates a new handle to the same underlying state.
#[derive(Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full price series for a product, oldest first.
    pub async fn price_points(&self, product_id: Uuid) -> Vec<PricePoint> {
        let state = self.state.lock().await;
        let mut points: Vec<PricePoint> = state
            .prices
            .iter()
            .filter(|p| p.product_id == product_id)
            .cloned()
            .collect();
        points.sort_by_key(|p| p.recorded_at);
        points
    }

    /// Direct item lookup, independent of status.
    pub async fn get_item(&self, id: Uuid) -> Option<QueueItem> {
        self.state.lock().await.items.get(&id).cloned()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        self.state.lock().await.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.state.lock().await.jobs.get(&id).cloned())
    }

    async fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let state = self.state.lock().await;
        let mut jobs: Vec<Job> = state.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn list_schedulable_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let state = self.state.lock().await;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|j| {
                j.is_active && matches!(j.status, JobStatus::Pending | JobStatus::Completed)
            })
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let mut updated = job.clone();
        updated.updated_at = Utc::now();
        state.jobs.insert(job.id, updated);
        Ok(())
    }

    async fn try_begin_run(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let mut state = self.state.lock().await;
        match state.jobs.get_mut(&id) {
            Some(job) if job.status != JobStatus::Running => {
                let now = Utc::now();
                job.status = JobStatus::Running;
                job.started_at = Some(now);
                job.updated_at = now;
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_job(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let existed = state.jobs.remove(&id).is_some();
        if existed {
            state.items.retain(|_, item| item.job_id != id);
        }
        Ok(existed)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn enqueue(&self, item: &QueueItem) -> Result<(), StoreError> {
        self.state.lock().await.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn dequeue_batch(
        &self,
        job_id: Option<Uuid>,
        max: usize,
    ) -> Result<Vec<QueueItem>, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let mut candidates: Vec<Uuid> = state
            .items
            .values()
            .filter(|item| {
                item.status == QueueItemStatus::Pending
                    && job_id.map_or(true, |id| item.job_id == id)
            })
            .map(|item| item.id)
            .collect();

        candidates.sort_by(|a, b| {
            let ia = &state.items[a];
            let ib = &state.items[b];
            ib.priority
                .cmp(&ia.priority)
                .then(ia.scheduled_at.cmp(&ib.scheduled_at))
        });
        candidates.truncate(max);

        let mut claimed = Vec::with_capacity(candidates.len());
        for id in candidates {
            if let Some(item) = state.items.get_mut(&id) {
                item.status = QueueItemStatus::InProgress;
                item.processed_at = Some(now);
                item.updated_at = now;
                claimed.push(item.clone());
            }
        }

        Ok(claimed)
    }

    async fn find_pending_by_url(
        &self,
        job_id: Uuid,
        url: &str,
    ) -> Result<Option<QueueItem>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .items
            .values()
            .filter(|item| {
                item.job_id == job_id
                    && item.url == url
                    && item.status == QueueItemStatus::Pending
            })
            .min_by_key(|item| item.scheduled_at)
            .cloned())
    }

    async fn mark_in_progress(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(item) = state.items.get_mut(&id) {
            let now = Utc::now();
            item.status = QueueItemStatus::InProgress;
            item.processed_at = Some(now);
            item.updated_at = now;
        }
        Ok(())
    }

    async fn mark_completed(&self, id: Uuid, result: serde_json::Value) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(item) = state.items.get_mut(&id) {
            item.status = QueueItemStatus::Completed;
            item.result = Some(result);
            item.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(item) = state.items.get_mut(&id) {
            item.status = QueueItemStatus::Failed;
            item.error_message = Some(error.to_string());
            item.retry_count += 1;
            item.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn release(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(item) = state.items.get_mut(&id) {
            if item.status == QueueItemStatus::InProgress {
                item.status = QueueItemStatus::Pending;
                item.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn queue_length(&self) -> Result<i64, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .items
            .values()
            .filter(|item| item.status == QueueItemStatus::Pending)
            .count() as i64)
    }

    async fn reopen_failed(&self) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let budgets: HashMap<Uuid, i32> =
            state.jobs.iter().map(|(id, job)| (*id, job.max_retries)).collect();

        let now = Utc::now();
        let mut reopened = 0;
        for item in state.items.values_mut() {
            if item.status == QueueItemStatus::Failed {
                let budget = budgets.get(&item.job_id).copied().unwrap_or(0);
                if item.retry_count < budget {
                    item.status = QueueItemStatus::Pending;
                    item.updated_at = now;
                    reopened += 1;
                }
            }
        }

        Ok(reopened)
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn find_product_by_url(&self, url: &str) -> Result<Option<Product>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.products.values().find(|p| p.url == url).cloned())
    }

    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        self.state.lock().await.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> Result<(), StoreError> {
        self.state.lock().await.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn latest_price(&self, product_id: Uuid) -> Result<Option<PricePoint>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .prices
            .iter()
            .filter(|p| p.product_id == product_id)
            .max_by_key(|p| p.recorded_at)
            .cloned())
    }

    async fn append_price(&self, point: &PricePoint) -> Result<(), StoreError> {
        self.state.lock().await.prices.push(point.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{JobFrequency, JobPriority};
    use chrono::Duration;

    fn job(max_retries: i32) -> Job {
        Job::new(
            "test job",
            JobFrequency::Hourly,
            None,
            JobPriority::Normal,
            true,
            max_retries,
            Utc::now(),
        )
    }

    fn item(job_id: Uuid, url: &str, priority: JobPriority) -> QueueItem {
        QueueItem::new(url, job_id, priority, Utc::now())
    }

    #[tokio::test]
    async fn dequeue_respects_limit_and_order() {
        let store = MemoryStore::new();
        let parent = job(3);
        store.insert_job(&parent).await.unwrap();

        let now = Utc::now();
        let mut low = QueueItem::new("https://example.com/a", parent.id, JobPriority::Low, now);
        low.scheduled_at = now - Duration::minutes(10);
        let mut critical =
            QueueItem::new("https://example.com/b", parent.id, JobPriority::Critical, now);
        critical.scheduled_at = now;
        let mut normal_old =
            QueueItem::new("https://example.com/c", parent.id, JobPriority::Normal, now);
        normal_old.scheduled_at = now - Duration::minutes(5);
        let mut normal_new =
            QueueItem::new("https://example.com/d", parent.id, JobPriority::Normal, now);
        normal_new.scheduled_at = now - Duration::minutes(1);

        for it in [&low, &critical, &normal_old, &normal_new] {
            store.enqueue(it).await.unwrap();
        }

        let batch = store.dequeue_batch(None, 3).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].id, critical.id);
        assert_eq!(batch[1].id, normal_old.id);
        assert_eq!(batch[2].id, normal_new.id);

        // Claimed items are in progress; the leftover is still pending.
        assert!(batch.iter().all(|i| i.status == QueueItemStatus::InProgress));
        assert_eq!(store.queue_length().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dequeue_does_not_redeliver_claimed_items() {
        let store = MemoryStore::new();
        let parent = job(3);
        store.insert_job(&parent).await.unwrap();
        store
            .enqueue(&item(parent.id, "https://example.com/a", JobPriority::Normal))
            .await
            .unwrap();

        let first = store.dequeue_batch(None, 10).await.unwrap();
        assert_eq!(first.len(), 1);

        let second = store.dequeue_batch(None, 10).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn duplicate_urls_produce_distinct_items() {
        let store = MemoryStore::new();
        let parent = job(3);
        store.insert_job(&parent).await.unwrap();

        let a = item(parent.id, "https://example.com/same", JobPriority::Normal);
        let b = item(parent.id, "https://example.com/same", JobPriority::Normal);
        store.enqueue(&a).await.unwrap();
        store.enqueue(&b).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(store.queue_length().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn mark_failed_increments_retry_count() {
        let store = MemoryStore::new();
        let parent = job(3);
        store.insert_job(&parent).await.unwrap();
        let it = item(parent.id, "https://example.com/a", JobPriority::Normal);
        store.enqueue(&it).await.unwrap();

        store.mark_failed(it.id, "timeout").await.unwrap();
        store.mark_failed(it.id, "timeout again").await.unwrap();

        let batch = store.dequeue_batch(None, 10).await.unwrap();
        assert!(batch.is_empty(), "failed items are not pending");

        store.reopen_failed().await.unwrap();
        let reopened = store.dequeue_batch(None, 10).await.unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened[0].retry_count, 2);
        assert_eq!(reopened[0].error_message.as_deref(), Some("timeout again"));
    }

    #[tokio::test]
    async fn reopen_failed_honors_job_budget() {
        let store = MemoryStore::new();
        let parent = job(2);
        store.insert_job(&parent).await.unwrap();

        let exhausted = item(parent.id, "https://example.com/a", JobPriority::Normal);
        let retryable = item(parent.id, "https://example.com/b", JobPriority::Normal);
        store.enqueue(&exhausted).await.unwrap();
        store.enqueue(&retryable).await.unwrap();

        store.mark_failed(exhausted.id, "x").await.unwrap();
        store.mark_failed(exhausted.id, "x").await.unwrap();
        store.mark_failed(retryable.id, "y").await.unwrap();

        let reopened = store.reopen_failed().await.unwrap();
        assert_eq!(reopened, 1);

        let batch = store.dequeue_batch(None, 10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, retryable.id);
    }

    #[tokio::test]
    async fn try_begin_run_excludes_running_jobs() {
        let store = MemoryStore::new();
        let parent = job(3);
        store.insert_job(&parent).await.unwrap();

        let first = store.try_begin_run(parent.id).await.unwrap();
        assert!(first.is_some());
        assert_eq!(first.unwrap().status, JobStatus::Running);

        let second = store.try_begin_run(parent.id).await.unwrap();
        assert!(second.is_none(), "a running job must not be claimed again");
    }

    #[tokio::test]
    async fn delete_job_cascades_to_items() {
        let store = MemoryStore::new();
        let parent = job(3);
        store.insert_job(&parent).await.unwrap();
        store
            .enqueue(&item(parent.id, "https://example.com/a", JobPriority::Normal))
            .await
            .unwrap();

        assert!(store.delete_job(parent.id).await.unwrap());
        assert_eq!(store.queue_length().await.unwrap(), 0);
        assert!(store.get_job(parent.id).await.unwrap().is_none());
    }
}
