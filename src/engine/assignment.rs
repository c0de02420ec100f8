use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::availability::first_overlap;
use crate::engine::jobs::get_job;
use crate::engine::ranking;
use crate::error::AppError;
use crate::models::availability::{AvailabilityInterval, AvailabilityStatus};
use crate::models::job::{Job, JobState};
use crate::state::AppState;

/// Assigns a pending job to `driver_id` and blocks the job window on the
/// driver's calendar. All checks and writes happen inside one transaction.
pub async fn accept_job(state: &AppState, job_id: Uuid, driver_id: Uuid) -> Result<Job, AppError> {
    let result = accept_in_transaction(state, job_id, driver_id).await;
    state.metrics.record_transition("accept", result.is_ok());

    let job = match result {
        Ok(job) => job,
        Err(err) => {
            warn!(job_id = %job_id, driver_id = %driver_id, error = %err, "job acceptance refused");
            return Err(err);
        }
    };

    info!(job_id = %job_id, driver_id = %driver_id, "job accepted");

    if let Err(err) = state.notifier.notify_job_accepted(job_id, driver_id) {
        warn!(job_id = %job_id, error = %err, "job accepted notification failed");
    }

    Ok(job)
}

async fn accept_in_transaction(
    state: &AppState,
    job_id: Uuid,
    driver_id: Uuid,
) -> Result<Job, AppError> {
    let _tx = state.begin("accept_job").await?;

    let mut job = get_job(state, job_id)?;

    if job.state != JobState::Pending {
        return Err(AppError::InvalidState(format!(
            "job {job_id} is {} and not available for acceptance",
            job.state
        )));
    }
    if !state.drivers.contains_key(&driver_id) {
        return Err(AppError::NotFound(format!("driver {driver_id} not found")));
    }
    if !job.visibility.is_open_to(&driver_id) {
        return Err(AppError::InvalidOperation(format!(
            "driver {driver_id} has no access to private job {job_id}"
        )));
    }

    let clashing_job = state
        .jobs
        .iter()
        .find(|entry| {
            let other = entry.value();
            other.id != job_id
                && other.assigned_driver_id == Some(driver_id)
                && other.state.is_active()
                && other.window_overlaps(job.start_date, job.end_date)
        })
        .map(|entry| *entry.key());
    if let Some(other_id) = clashing_job {
        return Err(AppError::Conflict(format!(
            "driver {driver_id} is already assigned to job {other_id} at this time"
        )));
    }

    if let Some(existing) = first_overlap(state, driver_id, job.start_date, job.end_date, None) {
        return Err(AppError::Conflict(format!(
            "driver {driver_id} is already {:?} from {} to {}",
            existing.status, existing.start_date, existing.end_date
        )));
    }

    // Both records are fully built before either is written.
    let now = Utc::now();
    let interval = AvailabilityInterval {
        id: Uuid::new_v4(),
        driver_id,
        start_date: job.start_date,
        end_date: job.end_date,
        status: AvailabilityStatus::Job,
        job_id: Some(job_id),
        created_at: now,
    };
    job.state = JobState::Accepted;
    job.assigned_driver_id = Some(driver_id);
    job.updated_at = now;

    state.availability.insert(interval.id, interval);
    state.jobs.insert(job_id, job.clone());

    Ok(job)
}

/// Hands an accepted job back to the pool. The driver's cancellation count is
/// updated afterwards on a best-effort basis; a ranking failure never undoes
/// the rejection.
pub async fn reject_job(
    state: &AppState,
    job_id: Uuid,
    driver_id: Uuid,
    reason: Option<String>,
) -> Result<Job, AppError> {
    let reason = reason
        .map(|reason| reason.trim().to_string())
        .filter(|reason| !reason.is_empty());

    let result = reject_in_transaction(state, job_id, driver_id, reason.as_deref()).await;
    state.metrics.record_transition("reject", result.is_ok());

    let (job, released) = match result {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(job_id = %job_id, driver_id = %driver_id, error = %err, "job rejection refused");
            return Err(err);
        }
    };

    info!(job_id = %job_id, driver_id = %driver_id, released, "job rejected");

    if let Err(err) = ranking::credit_cancellation(state, driver_id).await {
        warn!(driver_id = %driver_id, job_id = %job_id, error = %err, "failed to record cancellation; rejection stands");
    }

    if let Err(err) = state
        .notifier
        .notify_job_cancelled(job_id, driver_id, reason.as_deref())
    {
        warn!(job_id = %job_id, error = %err, "job cancelled notification failed");
    }

    Ok(job)
}

async fn reject_in_transaction(
    state: &AppState,
    job_id: Uuid,
    driver_id: Uuid,
    reason: Option<&str>,
) -> Result<(Job, usize), AppError> {
    let _tx = state.begin("reject_job").await?;

    let mut job = get_job(state, job_id)?;

    if job.assigned_driver_id != Some(driver_id) {
        return Err(AppError::InvalidOperation(format!(
            "driver {driver_id} is not assigned to job {job_id}"
        )));
    }
    if job.state != JobState::Accepted {
        return Err(AppError::InvalidState(format!(
            "job {job_id} is {}; only ACCEPTED jobs can be rejected",
            job.state
        )));
    }

    let linked: Vec<Uuid> = state
        .availability
        .iter()
        .filter(|entry| {
            let interval = entry.value();
            interval.driver_id == driver_id
                && interval.job_id == Some(job_id)
                && interval.status == AvailabilityStatus::Job
        })
        .map(|entry| *entry.key())
        .collect();

    let note = match reason {
        Some(reason) => format!("Previous driver rejected: {reason}"),
        None => "Previous driver rejected the job".to_string(),
    };
    job.additional_details = Some(match job.additional_details.take() {
        Some(details) if !details.trim().is_empty() => format!("{details}\n{note}"),
        _ => note,
    });
    job.state = JobState::Pending;
    job.assigned_driver_id = None;
    job.updated_at = Utc::now();

    for interval_id in &linked {
        state.availability.remove(interval_id);
    }
    state.jobs.insert(job_id, job.clone());

    Ok((job, linked.len()))
}
