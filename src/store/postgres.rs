use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

use crate::models::job::{Job, JobFrequency, JobPriority, JobStatus};
use crate::models::product::{PricePoint, Product};
use crate::models::queue::{QueueItem, QueueItemStatus};
use crate::scraping::marketplace::Marketplace;
use crate::store::{JobStore, ProductStore, QueueStore, StoreError};

/// Postgres-backed implementation of every store trait over one pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool with production settings.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        Ok(Self::new(pool))
    }

    /// Run schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(sqlx::Error::Migrate(Box::new(e))))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const JOB_COLUMNS: &str = "id, name, status, frequency, cron_expression, priority, is_active, \
     max_retries, run_count, success_count, failure_count, products_scraped, last_run_at, \
     next_run_at, started_at, completed_at, last_duration_ms, error_message, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, job_id, url, marketplace, priority, status, retry_count, \
     scheduled_at, processed_at, result, error_message, created_at, updated_at";

fn job_from_row(row: &sqlx::postgres::PgRow) -> Result<Job, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let frequency: String = row.try_get("frequency")?;
    let priority: i16 = row.try_get("priority")?;

    Ok(Job {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        status: status.parse().unwrap_or(JobStatus::Pending),
        frequency: frequency.parse().unwrap_or(JobFrequency::Manual),
        cron_expression: row.try_get("cron_expression")?,
        priority: JobPriority::from_rank(priority),
        is_active: row.try_get("is_active")?,
        max_retries: row.try_get("max_retries")?,
        run_count: row.try_get("run_count")?,
        success_count: row.try_get("success_count")?,
        failure_count: row.try_get("failure_count")?,
        products_scraped: row.try_get("products_scraped")?,
        last_run_at: row.try_get("last_run_at")?,
        next_run_at: row.try_get("next_run_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        last_duration_ms: row.try_get("last_duration_ms")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn item_from_row(row: &sqlx::postgres::PgRow) -> Result<QueueItem, sqlx::Error> {
    let marketplace: String = row.try_get("marketplace")?;
    let status: String = row.try_get("status")?;
    let priority: i16 = row.try_get("priority")?;

    Ok(QueueItem {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        url: row.try_get("url")?,
        marketplace: marketplace.parse().unwrap_or(Marketplace::Other),
        priority: JobPriority::from_rank(priority),
        status: status.parse().unwrap_or(QueueItemStatus::Pending),
        retry_count: row.try_get("retry_count")?,
        scheduled_at: row.try_get("scheduled_at")?,
        processed_at: row.try_get("processed_at")?,
        result: row.try_get("result")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn product_from_row(row: &sqlx::postgres::PgRow) -> Result<Product, sqlx::Error> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        image_url: row.try_get("image_url")?,
        sku: row.try_get("sku")?,
        current_price: row.try_get("current_price")?,
        is_available: row.try_get("is_available")?,
        last_updated: row.try_get("last_updated")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl JobStore for PostgresStore {
    async fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, name, status, frequency, cron_expression, priority, is_active,
                              max_retries, run_count, success_count, failure_count,
                              products_scraped, last_run_at, next_run_at, started_at,
                              completed_at, last_duration_ms, error_message, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(job.id)
        .bind(&job.name)
        .bind(job.status.to_string())
        .bind(job.frequency.to_string())
        .bind(&job.cron_expression)
        .bind(job.priority.rank())
        .bind(job.is_active)
        .bind(job.max_retries)
        .bind(job.run_count)
        .bind(job.success_count)
        .bind(job.failure_count)
        .bind(job.products_scraped)
        .bind(job.last_run_at)
        .bind(job.next_run_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.last_duration_ms)
        .bind(&job.error_message)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| job_from_row(&r)).transpose().map_err(Into::into)
    }

    async fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect::<Result<_, _>>().map_err(Into::into)
    }

    async fn list_schedulable_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE is_active AND status IN ('pending', 'completed') \
             ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect::<Result<_, _>>().map_err(Into::into)
    }

    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET name = $2, status = $3, frequency = $4, cron_expression = $5, priority = $6,
                is_active = $7, max_retries = $8, run_count = $9, success_count = $10,
                failure_count = $11, products_scraped = $12, last_run_at = $13, next_run_at = $14,
                started_at = $15, completed_at = $16, last_duration_ms = $17, error_message = $18,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(&job.name)
        .bind(job.status.to_string())
        .bind(job.frequency.to_string())
        .bind(&job.cron_expression)
        .bind(job.priority.rank())
        .bind(job.is_active)
        .bind(job.max_retries)
        .bind(job.run_count)
        .bind(job.success_count)
        .bind(job.failure_count)
        .bind(job.products_scraped)
        .bind(job.last_run_at)
        .bind(job.next_run_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.last_duration_ms)
        .bind(&job.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn try_begin_run(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        // Single conditional update: the WHERE clause is the
        // mutual-exclusion check, so two racing callers cannot both
        // move the job into running.
        let row = sqlx::query(&format!(
            "UPDATE jobs \
             SET status = 'running', started_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status <> 'running' \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| job_from_row(&r)).transpose().map_err(Into::into)
    }

    async fn delete_job(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl QueueStore for PostgresStore {
    async fn enqueue(&self, item: &QueueItem) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO queue_items (id, job_id, url, marketplace, priority, status, retry_count,
                                     scheduled_at, processed_at, result, error_message,
                                     created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(item.id)
        .bind(item.job_id)
        .bind(&item.url)
        .bind(item.marketplace.to_string())
        .bind(item.priority.rank())
        .bind(item.status.to_string())
        .bind(item.retry_count)
        .bind(item.scheduled_at)
        .bind(item.processed_at)
        .bind(&item.result)
        .bind(&item.error_message)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn dequeue_batch(
        &self,
        job_id: Option<Uuid>,
        max: usize,
    ) -> Result<Vec<QueueItem>, StoreError> {
        // Claim and read in one statement; SKIP LOCKED keeps two
        // concurrent claimers from blocking on or double-claiming the
        // same rows.
        let rows = sqlx::query(&format!(
            "UPDATE queue_items \
             SET status = 'in_progress', processed_at = NOW(), updated_at = NOW() \
             WHERE id IN ( \
                 SELECT id FROM queue_items \
                 WHERE status = 'pending' AND ($1::uuid IS NULL OR job_id = $1) \
                 ORDER BY priority DESC, scheduled_at ASC \
                 LIMIT $2 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(job_id)
        .bind(max as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut items: Vec<QueueItem> = rows
            .iter()
            .map(item_from_row)
            .collect::<Result<_, _>>()?;

        // RETURNING order is not defined; restore the claim order.
        items.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.scheduled_at.cmp(&b.scheduled_at))
        });

        Ok(items)
    }

    async fn find_pending_by_url(
        &self,
        job_id: Uuid,
        url: &str,
    ) -> Result<Option<QueueItem>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM queue_items \
             WHERE job_id = $1 AND url = $2 AND status = 'pending' \
             ORDER BY scheduled_at ASC \
             LIMIT 1"
        ))
        .bind(job_id)
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| item_from_row(&r)).transpose().map_err(Into::into)
    }

    async fn mark_in_progress(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE queue_items \
             SET status = 'in_progress', processed_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_completed(&self, id: Uuid, result: serde_json::Value) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE queue_items \
             SET status = 'completed', result = $2, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(result)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE queue_items \
             SET status = 'failed', error_message = $2, retry_count = retry_count + 1, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn release(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE queue_items \
             SET status = 'pending', updated_at = NOW() \
             WHERE id = $1 AND status = 'in_progress'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn queue_length(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM queue_items WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get("count")?)
    }

    async fn reopen_failed(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE queue_items \
             SET status = 'pending', updated_at = NOW() \
             FROM jobs \
             WHERE queue_items.job_id = jobs.id \
               AND queue_items.status = 'failed' \
               AND queue_items.retry_count < jobs.max_retries",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ProductStore for PostgresStore {
    async fn find_product_by_url(&self, url: &str) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, url, image_url, sku, current_price, is_available, last_updated, \
                    created_at \
             FROM products WHERE url = $1",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| product_from_row(&r)).transpose().map_err(Into::into)
    }

    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, url, image_url, sku, current_price, is_available,
                                  last_updated, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.url)
        .bind(&product.image_url)
        .bind(&product.sku)
        .bind(product.current_price)
        .bind(product.is_available)
        .bind(product.last_updated)
        .bind(product.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_product(&self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE products
            SET name = $2, image_url = $3, sku = $4, current_price = $5, is_available = $6,
                last_updated = $7
            WHERE id = $1
            "#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.image_url)
        .bind(&product.sku)
        .bind(product.current_price)
        .bind(product.is_available)
        .bind(product.last_updated)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_price(&self, product_id: Uuid) -> Result<Option<PricePoint>, StoreError> {
        let row = sqlx::query(
            "SELECT id, product_id, price, recorded_at \
             FROM price_history \
             WHERE product_id = $1 \
             ORDER BY recorded_at DESC \
             LIMIT 1",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(PricePoint {
                id: r.try_get("id")?,
                product_id: r.try_get("product_id")?,
                price: r.try_get("price")?,
                recorded_at: r.try_get("recorded_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn append_price(&self, point: &PricePoint) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO price_history (id, product_id, price, recorded_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(point.id)
        .bind(point.product_id)
        .bind(point.price)
        .bind(point.recorded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
