use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::job::{Job, JobFrequency, JobStatus};
use crate::store::{JobStore, StoreError};

/// Computes next-run times from each job's frequency policy and
/// decides whether a job is due.
pub struct JobScheduler {
    jobs: Arc<dyn JobStore>,
}

impl JobScheduler {
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self { jobs }
    }

    /// Next run time under the job's current policy.
    ///
    /// Manual jobs never produce one. Fixed-interval jobs add their
    /// period to the last run (creation time if the job never ran).
    /// Cron jobs take the next occurrence strictly after the last
    /// run, in UTC; an invalid expression yields `None` and is logged
    /// rather than raised. A frequency change between runs simply
    /// recomputes from the new policy over the existing last run.
    pub fn compute_next_run(job: &Job) -> Option<DateTime<Utc>> {
        let last_run = job.last_run_at.unwrap_or(job.created_at);

        match job.frequency {
            JobFrequency::Manual => None,
            JobFrequency::Hourly | JobFrequency::Daily | JobFrequency::Weekly => {
                job.frequency.period().map(|period| last_run + period)
            }
            JobFrequency::Custom => job
                .cron_expression
                .as_deref()
                .and_then(|expr| next_cron_occurrence(expr, last_run)),
        }
    }

    /// Whether the job should run now. Inactive, already-running and
    /// manual jobs are never due.
    pub fn is_due(job: &Job) -> bool {
        // One clock read per decision.
        Self::is_due_at(job, Utc::now())
    }

    pub fn is_due_at(job: &Job, now: DateTime<Utc>) -> bool {
        if !job.is_active {
            return false;
        }

        if job.status == JobStatus::Running {
            tracing::debug!(job_id = %job.id, "job is already running");
            return false;
        }

        if job.frequency == JobFrequency::Manual {
            return false;
        }

        let due = Self::compute_next_run(job).map_or(false, |next| next <= now);
        if due {
            tracing::info!(job_id = %job.id, name = %job.name, "job is due for execution");
        }

        due
    }

    /// Stamp the job's next-run time without recording a run.
    pub async fn mark_scheduled(&self, job_id: Uuid) -> Result<(), StoreError> {
        let Some(mut job) = self.jobs.get_job(job_id).await? else {
            tracing::warn!(%job_id, "cannot schedule unknown job");
            return Ok(());
        };

        job.next_run_at = Self::compute_next_run(&job);
        self.jobs.update_job(&job).await?;

        tracing::info!(%job_id, name = %job.name, next_run = ?job.next_run_at, "job scheduled");
        Ok(())
    }

    /// Record a completed run: update the last-run stamp, bump the
    /// run count and compute the next run from the new last-run.
    pub async fn mark_ran_and_reschedule(&self, job_id: Uuid) -> Result<(), StoreError> {
        let Some(mut job) = self.jobs.get_job(job_id).await? else {
            tracing::warn!(%job_id, "cannot reschedule unknown job");
            return Ok(());
        };

        job.last_run_at = Some(Utc::now());
        job.run_count += 1;
        job.next_run_at = Self::compute_next_run(&job);
        self.jobs.update_job(&job).await?;

        tracing::info!(%job_id, name = %job.name, next_run = ?job.next_run_at, "job rescheduled");
        Ok(())
    }
}

/// Next occurrence of a cron expression strictly after `after`, UTC.
///
/// Standard 5-field expressions are accepted by prepending a seconds
/// field; 6-field expressions pass through unchanged.
fn next_cron_occurrence(expr: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let normalized = normalize_cron(expr);

    match Schedule::from_str(&normalized) {
        Ok(schedule) => schedule.after(&after).next(),
        Err(err) => {
            tracing::error!(cron = expr, error = %err, "invalid cron expression");
            None
        }
    }
}

fn normalize_cron(expr: &str) -> String {
    if expr.split_whitespace().count() == 5 {
        format!("0 {}", expr.trim())
    } else {
        expr.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::JobPriority;
    use chrono::{Duration, TimeZone};

    fn job(frequency: JobFrequency, cron: Option<&str>) -> Job {
        let created = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        Job::new(
            "scheduled job",
            frequency,
            cron.map(str::to_string),
            JobPriority::Normal,
            true,
            3,
            created,
        )
    }

    #[test]
    fn fixed_intervals_add_period_to_last_run() {
        let last_run = Utc.with_ymd_and_hms(2026, 3, 2, 12, 30, 0).unwrap();

        for (frequency, period) in [
            (JobFrequency::Hourly, Duration::hours(1)),
            (JobFrequency::Daily, Duration::days(1)),
            (JobFrequency::Weekly, Duration::days(7)),
        ] {
            let mut j = job(frequency, None);
            j.last_run_at = Some(last_run);
            assert_eq!(JobScheduler::compute_next_run(&j), Some(last_run + period));
        }
    }

    #[test]
    fn never_run_job_schedules_from_creation_time() {
        let j = job(JobFrequency::Hourly, None);
        assert_eq!(
            JobScheduler::compute_next_run(&j),
            Some(j.created_at + Duration::hours(1))
        );
    }

    #[test]
    fn manual_jobs_have_no_next_run_and_are_never_due() {
        let j = job(JobFrequency::Manual, None);
        assert_eq!(JobScheduler::compute_next_run(&j), None);
        assert!(!JobScheduler::is_due_at(&j, j.created_at + Duration::days(365)));
    }

    #[test]
    fn cron_next_occurrence_is_strictly_after_last_run() {
        let mut j = job(JobFrequency::Custom, Some("0 0 * * *"));
        j.last_run_at = Some(Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap());

        assert_eq!(
            JobScheduler::compute_next_run(&j),
            Some(Utc.with_ymd_and_hms(2026, 3, 3, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn six_field_cron_is_accepted() {
        let mut j = job(JobFrequency::Custom, Some("0 15 10 * * *"));
        j.last_run_at = Some(Utc.with_ymd_and_hms(2026, 3, 2, 11, 0, 0).unwrap());

        assert_eq!(
            JobScheduler::compute_next_run(&j),
            Some(Utc.with_ymd_and_hms(2026, 3, 3, 10, 15, 0).unwrap())
        );
    }

    #[test]
    fn invalid_cron_yields_none_without_panicking() {
        let j = job(JobFrequency::Custom, Some("definitely not cron"));
        assert_eq!(JobScheduler::compute_next_run(&j), None);
        assert!(!JobScheduler::is_due_at(&j, Utc::now()));
    }

    #[test]
    fn custom_without_expression_yields_none() {
        let j = job(JobFrequency::Custom, None);
        assert_eq!(JobScheduler::compute_next_run(&j), None);
    }

    #[test]
    fn hourly_job_due_after_period_elapses() {
        let last_run = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let mut j = job(JobFrequency::Hourly, None);
        j.last_run_at = Some(last_run);

        assert!(JobScheduler::is_due_at(&j, last_run + Duration::minutes(61)));
        assert!(!JobScheduler::is_due_at(&j, last_run + Duration::minutes(30)));
    }

    #[test]
    fn running_and_inactive_jobs_are_not_due() {
        let last_run = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let now = last_run + Duration::hours(2);

        let mut running = job(JobFrequency::Hourly, None);
        running.last_run_at = Some(last_run);
        running.status = JobStatus::Running;
        assert!(!JobScheduler::is_due_at(&running, now));

        let mut inactive = job(JobFrequency::Hourly, None);
        inactive.last_run_at = Some(last_run);
        inactive.is_active = false;
        assert!(!JobScheduler::is_due_at(&inactive, now));
    }

    #[test]
    fn frequency_change_recomputes_from_existing_last_run() {
        let last_run = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let mut j = job(JobFrequency::Hourly, None);
        j.last_run_at = Some(last_run);
        assert_eq!(JobScheduler::compute_next_run(&j), Some(last_run + Duration::hours(1)));

        j.frequency = JobFrequency::Daily;
        assert_eq!(JobScheduler::compute_next_run(&j), Some(last_run + Duration::days(1)));
    }
}
