//! Persistence boundary.
//!
//! Jobs, queue items and products live behind narrow store traits so
//! the scheduling core never touches a database handle directly. The
//! production implementation is Postgres; an in-memory implementation
//! backs tests and embedded use.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::job::Job;
use crate::models::product::{PricePoint, Product};
use crate::models::queue::QueueItem;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
}

/// Job collection. Single-row state transitions that guard mutual
/// exclusion (`try_begin_run`) are compare-and-swap, not
/// read-modify-write.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: &Job) -> Result<(), StoreError>;

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    async fn list_jobs(&self) -> Result<Vec<Job>, StoreError>;

    /// Active jobs in `Pending` or `Completed`: the candidates the
    /// background driver considers for scheduling.
    async fn list_schedulable_jobs(&self) -> Result<Vec<Job>, StoreError>;

    async fn update_job(&self, job: &Job) -> Result<(), StoreError>;

    /// Atomically move a job that is not `Running` into `Running`,
    /// stamping its start time. Returns the job as claimed, or `None`
    /// when the job is missing or already running — the caller must
    /// not start a second concurrent execution in that case.
    async fn try_begin_run(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Delete a job and, by ownership, its queue items. Returns false
    /// when no such job exists. Callers must refuse deletion of a
    /// running job before getting here.
    async fn delete_job(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Connectivity probe for health reporting.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Queue item collection.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn enqueue(&self, item: &QueueItem) -> Result<(), StoreError>;

    /// Claim up to `max` pending items, optionally scoped to one job,
    /// ordered by priority descending then scheduled time ascending.
    /// Claimed items transition `pending → in_progress` atomically as
    /// part of the read, so two concurrent callers can never claim
    /// the same item.
    async fn dequeue_batch(
        &self,
        job_id: Option<Uuid>,
        max: usize,
    ) -> Result<Vec<QueueItem>, StoreError>;

    /// Oldest pending item of a job for the given URL, if any. Used
    /// by the ad-hoc single-URL execution path.
    async fn find_pending_by_url(
        &self,
        job_id: Uuid,
        url: &str,
    ) -> Result<Option<QueueItem>, StoreError>;

    /// Idempotent status write; repeated calls overwrite timestamps.
    async fn mark_in_progress(&self, id: Uuid) -> Result<(), StoreError>;

    async fn mark_completed(&self, id: Uuid, result: serde_json::Value) -> Result<(), StoreError>;

    /// Records the error and increments the item's retry count.
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError>;

    /// Put a claimed (`in_progress`) item back to `pending` without
    /// charging its retry budget, e.g. when a run is cancelled before
    /// the item is processed.
    async fn release(&self, id: Uuid) -> Result<(), StoreError>;

    /// Number of `pending` items across all jobs.
    async fn queue_length(&self) -> Result<i64, StoreError>;

    /// Re-open `failed` items whose retry count is still under their
    /// job's budget. Returns how many items went back to `pending`.
    async fn reopen_failed(&self) -> Result<u64, StoreError>;
}

/// Product collection plus each product's append-only price series.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn find_product_by_url(&self, url: &str) -> Result<Option<Product>, StoreError>;

    async fn insert_product(&self, product: &Product) -> Result<(), StoreError>;

    async fn update_product(&self, product: &Product) -> Result<(), StoreError>;

    /// Most recent price point for a product, if any.
    async fn latest_price(&self, product_id: Uuid) -> Result<Option<PricePoint>, StoreError>;

    async fn append_price(&self, point: &PricePoint) -> Result<(), StoreError>;
}
