use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::jobs::executor::ExecuteError;
use crate::models::api::{
    ActiveResponse, CreateJobRequest, CreateJobResponse, ErrorBody, JobListResponse,
    JobStatusResponse, JobSummary, SetActiveRequest, TriggerResponse,
};
use crate::models::job::{Job, JobFrequency, JobStatus};
use crate::models::queue::QueueItem;

type ApiError = (StatusCode, Json<ErrorBody>);

fn internal_error(err: impl std::fmt::Display) -> ApiError {
    tracing::error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::new("internal error")),
    )
}

fn not_found() -> ApiError {
    (StatusCode::NOT_FOUND, Json(ErrorBody::new("Job not found")))
}

/// POST /api/v1/jobs — create a scraping job with its seed URLs.
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<CreateJobResponse>), ApiError> {
    if let Err(report) = request.validate() {
        return Err((StatusCode::BAD_REQUEST, Json(ErrorBody::new(report.to_string()))));
    }

    if request.frequency == JobFrequency::Custom
        && request
            .cron_expression
            .as_deref()
            .map_or(true, |expr| expr.trim().is_empty())
    {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::new("Cron expression is required for custom frequency")),
        ));
    }

    let now = Utc::now();
    let job = Job::new(
        request.name,
        request.frequency,
        request.cron_expression,
        request.priority,
        request.is_active,
        request.max_retries,
        now,
    );

    state.jobs.insert_job(&job).await.map_err(internal_error)?;

    for url in &request.urls {
        let item = QueueItem::new(url.clone(), job.id, request.priority, Utc::now());
        state.queue.enqueue(&item).await.map_err(internal_error)?;
        tracing::info!(%url, job_id = %job.id, priority = %request.priority, "URL enqueued");
    }

    state
        .scheduler
        .mark_scheduled(job.id)
        .await
        .map_err(internal_error)?;

    let scheduled = state
        .jobs
        .get_job(job.id)
        .await
        .map_err(internal_error)?
        .unwrap_or(job);

    tracing::info!(job_id = %scheduled.id, name = %scheduled.name, urls = request.urls.len(), "job created");

    Ok((
        StatusCode::CREATED,
        Json(CreateJobResponse {
            job_id: scheduled.id,
            name: scheduled.name,
            frequency: scheduled.frequency,
            priority: scheduled.priority,
            is_active: scheduled.is_active,
            next_run_at: scheduled.next_run_at,
            url_count: request.urls.len(),
        }),
    ))
}

/// GET /api/v1/jobs — list all jobs.
pub async fn list_jobs(State(state): State<AppState>) -> Result<Json<JobListResponse>, ApiError> {
    let jobs = state.jobs.list_jobs().await.map_err(internal_error)?;
    let summaries: Vec<JobSummary> = jobs.iter().map(JobSummary::from).collect();

    Ok(Json(JobListResponse {
        total: summaries.len(),
        jobs: summaries,
    }))
}

/// GET /api/v1/jobs/{id} — status snapshot including queue depth.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job = state
        .jobs
        .get_job(job_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(not_found)?;

    let queue_length = state.queue.queue_length().await.map_err(internal_error)?;

    Ok(Json(JobStatusResponse {
        summary: JobSummary::from(&job),
        products_scraped: job.products_scraped,
        queue_length,
        error_message: job.error_message,
    }))
}

/// POST /api/v1/jobs/{id}/execute — manual trigger; conflicts while
/// the job is running and never starts a second concurrent execution.
pub async fn trigger_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<(StatusCode, Json<TriggerResponse>), ApiError> {
    let job = state
        .jobs
        .get_job(job_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(not_found)?;

    if job.status == JobStatus::Running {
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorBody::new("Job is already running")),
        ));
    }

    tracing::info!(%job_id, name = %job.name, "manual execution triggered");

    let executor = state.executor.clone();
    let scheduler = state.scheduler.clone();
    let cancel = state.shutdown.clone();
    tokio::spawn(async move {
        match executor.execute_job(job_id, &cancel).await {
            Ok(_) => {
                if let Err(err) = scheduler.mark_ran_and_reschedule(job_id).await {
                    tracing::error!(%job_id, error = %err, "failed to reschedule job");
                }
            }
            Err(ExecuteError::AlreadyRunning(_)) => {
                // Lost the race against another trigger or the driver;
                // the claim check already prevented a double run.
                tracing::debug!(%job_id, "job picked up concurrently, skipping");
            }
            Err(err) => {
                tracing::error!(%job_id, error = %err, "manual execution errored");
            }
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            job_id,
            name: job.name,
            message: "Job execution started".to_string(),
        }),
    ))
}

/// PATCH /api/v1/jobs/{id}/active — set the active flag.
pub async fn set_active(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(request): Json<SetActiveRequest>,
) -> Result<Json<ActiveResponse>, ApiError> {
    let mut job = state
        .jobs
        .get_job(job_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(not_found)?;

    job.is_active = request.is_active;
    state.jobs.update_job(&job).await.map_err(internal_error)?;

    tracing::info!(%job_id, name = %job.name, is_active = job.is_active, "job active flag changed");

    Ok(Json(ActiveResponse {
        job_id,
        name: job.name,
        is_active: request.is_active,
    }))
}

/// DELETE /api/v1/jobs/{id} — refuse while running, cascade otherwise.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let job = state
        .jobs
        .get_job(job_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(not_found)?;

    if job.status == JobStatus::Running {
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorBody::new("Cannot delete a running job")),
        ));
    }

    state.jobs.delete_job(job_id).await.map_err(internal_error)?;

    tracing::info!(%job_id, name = %job.name, "job deleted");

    Ok(StatusCode::NO_CONTENT)
}
