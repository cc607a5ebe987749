use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a scraping job.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// How often a job runs. `Manual` jobs only run when triggered
/// explicitly; `Custom` jobs carry a cron expression.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobFrequency {
    Manual,
    Hourly,
    Daily,
    Weekly,
    Custom,
}

impl JobFrequency {
    /// Fixed interval for the non-cron recurring frequencies.
    pub fn period(self) -> Option<chrono::Duration> {
        match self {
            JobFrequency::Hourly => Some(chrono::Duration::hours(1)),
            JobFrequency::Daily => Some(chrono::Duration::days(1)),
            JobFrequency::Weekly => Some(chrono::Duration::days(7)),
            JobFrequency::Manual | JobFrequency::Custom => None,
        }
    }
}

/// Priority of a job and of the queue items it spawns. Queue items
/// are claimed highest-priority first, so the ordering matters.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl JobPriority {
    /// Numeric rank for ordered storage; higher claims first.
    pub fn rank(self) -> i16 {
        match self {
            JobPriority::Low => 0,
            JobPriority::Normal => 1,
            JobPriority::High => 2,
            JobPriority::Critical => 3,
        }
    }

    pub fn from_rank(rank: i16) -> Self {
        match rank {
            0 => JobPriority::Low,
            2 => JobPriority::High,
            3 => JobPriority::Critical,
            _ => JobPriority::Normal,
        }
    }
}

/// A named unit of recurring scraping work over a set of URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub status: JobStatus,
    pub frequency: JobFrequency,
    pub cron_expression: Option<String>,
    pub priority: JobPriority,
    pub is_active: bool,
    pub max_retries: i32,
    pub run_count: i32,
    pub success_count: i32,
    pub failure_count: i32,
    pub products_scraped: i32,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// New job in `Pending` with zeroed statistics, not yet scheduled.
    pub fn new(
        name: impl Into<String>,
        frequency: JobFrequency,
        cron_expression: Option<String>,
        priority: JobPriority,
        is_active: bool,
        max_retries: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: JobStatus::Pending,
            frequency,
            cron_expression,
            priority,
            is_active,
            max_retries,
            run_count: 0,
            success_count: 0,
            failure_count: 0,
            products_scraped: 0,
            last_run_at: None,
            next_run_at: None,
            started_at: None,
            completed_at: None,
            last_duration_ms: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}
