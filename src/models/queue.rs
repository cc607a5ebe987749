use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::JobPriority;
use crate::scraping::marketplace::Marketplace;

/// Lifecycle state of a single URL-fetch unit. A queue item moves
/// through exactly one status transition per attempt; `failed` items
/// are only re-opened by the retry sweep while their retry count is
/// under the owning job's budget.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QueueItemStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// One URL-fetch unit belonging to exactly one job.
///
/// `priority` is copied from the job at enqueue time and, together
/// with `scheduled_at`, defines the claim order: priority descending,
/// then earliest-scheduled first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub job_id: Uuid,
    pub url: String,
    pub marketplace: Marketplace,
    pub priority: JobPriority,
    pub status: QueueItemStatus,
    pub retry_count: i32,
    pub scheduled_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueItem {
    /// New pending item scheduled now. The marketplace tag is resolved
    /// from the URL once, at enqueue time.
    pub fn new(url: impl Into<String>, job_id: Uuid, priority: JobPriority, now: DateTime<Utc>) -> Self {
        let url = url.into();
        Self {
            id: Uuid::new_v4(),
            job_id,
            marketplace: Marketplace::detect(&url),
            url,
            priority,
            status: QueueItemStatus::Pending,
            retry_count: 0,
            scheduled_at: now,
            processed_at: None,
            result: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}
