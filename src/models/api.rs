use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{Job, JobFrequency, JobPriority, JobStatus};

/// Request to create a scraping job with its seed URLs.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateJobRequest {
    #[garde(length(min = 1, max = 200))]
    pub name: String,

    #[garde(length(min = 1))]
    pub urls: Vec<String>,

    #[garde(skip)]
    pub frequency: JobFrequency,

    #[garde(length(min = 1, max = 100))]
    pub cron_expression: Option<String>,

    #[garde(skip)]
    #[serde(default = "default_priority")]
    pub priority: JobPriority,

    #[garde(skip)]
    #[serde(default = "default_active")]
    pub is_active: bool,

    #[garde(range(min = 0, max = 10))]
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,
}

fn default_priority() -> JobPriority {
    JobPriority::Normal
}

fn default_active() -> bool {
    true
}

fn default_max_retries() -> i32 {
    3
}

/// Response after creating a job.
#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job_id: Uuid,
    pub name: String,
    pub frequency: JobFrequency,
    pub priority: JobPriority,
    pub is_active: bool,
    pub next_run_at: Option<DateTime<Utc>>,
    pub url_count: usize,
}

/// One row in the job listing.
#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub job_id: Uuid,
    pub name: String,
    pub status: JobStatus,
    pub frequency: JobFrequency,
    pub priority: JobPriority,
    pub is_active: bool,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub total_runs: i32,
    pub success_count: i32,
    pub failure_count: i32,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            name: job.name.clone(),
            status: job.status,
            frequency: job.frequency,
            priority: job.priority,
            is_active: job.is_active,
            next_run_at: job.next_run_at,
            last_run_at: job.last_run_at,
            total_runs: job.run_count,
            success_count: job.success_count,
            failure_count: job.failure_count,
        }
    }
}

/// Full status snapshot for one job, including the current pending
/// queue depth.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    #[serde(flatten)]
    pub summary: JobSummary,
    pub products_scraped: i32,
    pub queue_length: i64,
    pub error_message: Option<String>,
}

/// Listing of every job.
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub total: usize,
    pub jobs: Vec<JobSummary>,
}

/// Acknowledgement of a manual execution trigger.
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub job_id: Uuid,
    pub name: String,
    pub message: String,
}

/// Request to flip a job's active flag.
#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

/// Result of flipping a job's active flag.
#[derive(Debug, Serialize)]
pub struct ActiveResponse {
    pub job_id: Uuid,
    pub name: String,
    pub is_active: bool,
}

/// Request carrying a single URL (scraper test / validate endpoints).
#[derive(Debug, Deserialize, Validate)]
pub struct ScrapeUrlRequest {
    #[garde(length(min = 1, max = 2000))]
    pub url: String,
}

/// Request to scrape a batch of URLs at once.
#[derive(Debug, Deserialize, Validate)]
pub struct BatchScrapeRequest {
    #[garde(length(min = 1, max = 100))]
    pub urls: Vec<String>,
}

/// Batch scrape totals plus the per-URL outcomes.
#[derive(Debug, Serialize)]
pub struct BatchScrapeResponse {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<crate::scraping::orchestrator::ScrapeOutcome>,
}

/// URL validation outcome with detected marketplace.
#[derive(Debug, Serialize)]
pub struct ValidateUrlResponse {
    pub valid: bool,
    pub marketplace: String,
    pub message: String,
}

/// Uniform error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}
