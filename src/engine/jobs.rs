use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::availability::AvailabilityStatus;
use crate::models::job::{Job, JobPatch, JobState, JobVisibility, NewJob, PostType};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct AccessGrant {
    pub job_id: Uuid,
    pub added_drivers: Vec<Uuid>,
}

pub async fn create_job(state: &AppState, new_job: NewJob) -> Result<Job, AppError> {
    validate_descriptive(&new_job.client_name, &new_job.pickup_location)?;
    if new_job.start_date > new_job.end_date {
        return Err(AppError::InvalidRange(format!(
            "job window starts after it ends ({} > {})",
            new_job.start_date, new_job.end_date
        )));
    }
    if new_job.number_of_passengers == 0 {
        return Err(AppError::BadRequest(
            "number_of_passengers must be > 0".to_string(),
        ));
    }
    validate_amounts(new_job.distance, new_job.payment_amount)?;

    let now = Utc::now();
    let job = Job {
        id: Uuid::new_v4(),
        client_name: new_job.client_name,
        nationality: new_job.nationality,
        number_of_passengers: new_job.number_of_passengers,
        pickup_location: new_job.pickup_location,
        start_date: new_job.start_date,
        end_date: new_job.end_date,
        pickup_time: new_job.pickup_time,
        distance: new_job.distance,
        payment_amount: new_job.payment_amount,
        additional_details: new_job.additional_details,
        visibility: JobVisibility::for_post_type(new_job.post_type),
        state: JobState::Pending,
        assigned_driver_id: None,
        created_at: now,
        updated_at: now,
    };

    {
        let _tx = state.begin("create_job").await?;
        state.jobs.insert(job.id, job.clone());
    }

    info!(job_id = %job.id, post_type = ?new_job.post_type, "job created");

    // Private jobs announce themselves per driver as access is granted.
    if new_job.post_type == PostType::Public {
        if let Err(err) = state.notifier.notify_job_created(job.id, None) {
            warn!(job_id = %job.id, error = %err, "job created notification failed");
        }
    }

    Ok(job)
}

pub fn get_job(state: &AppState, id: Uuid) -> Result<Job, AppError> {
    state
        .jobs
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("job {id} not found")))
}

pub fn list_jobs(state: &AppState) -> Vec<Job> {
    let mut jobs: Vec<Job> = state
        .jobs
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    jobs.sort_by_key(|job| (job.start_date, job.created_at));
    jobs
}

/// Jobs currently or previously assigned to `driver_id`.
pub fn list_for_driver(state: &AppState, driver_id: Uuid) -> Vec<Job> {
    let mut jobs: Vec<Job> = state
        .jobs
        .iter()
        .filter(|entry| entry.value().assigned_driver_id == Some(driver_id))
        .map(|entry| entry.value().clone())
        .collect();
    jobs.sort_by_key(|job| (job.start_date, job.created_at));
    jobs
}

/// Pending public jobs plus pending private jobs the driver was granted.
pub fn list_available_for_driver(state: &AppState, driver_id: Uuid) -> Vec<Job> {
    let mut jobs: Vec<Job> = state
        .jobs
        .iter()
        .filter(|entry| {
            let job = entry.value();
            job.state == JobState::Pending && job.visibility.is_open_to(&driver_id)
        })
        .map(|entry| entry.value().clone())
        .collect();
    jobs.sort_by_key(|job| (job.start_date, job.created_at));
    jobs
}

pub async fn grant_private_access(
    state: &AppState,
    job_id: Uuid,
    driver_ids: Vec<Uuid>,
) -> Result<AccessGrant, AppError> {
    let added = {
        let _tx = state.begin("grant_private_access").await?;

        let mut job = get_job(state, job_id)?;
        let JobVisibility::Private { authorized_drivers } = &mut job.visibility else {
            return Err(AppError::InvalidOperation(format!(
                "job {job_id} is public; only private jobs carry an access list"
            )));
        };

        if let Some(unknown) = driver_ids.iter().find(|id| !state.drivers.contains_key(*id)) {
            return Err(AppError::NotFound(format!("driver {unknown} not found")));
        }

        let added: Vec<Uuid> = driver_ids
            .into_iter()
            .filter(|driver_id| authorized_drivers.insert(*driver_id))
            .collect();

        if !added.is_empty() {
            job.updated_at = Utc::now();
            state.jobs.insert(job_id, job);
        }
        added
    };

    info!(job_id = %job_id, added = added.len(), "private job access granted");

    if !added.is_empty() {
        if let Err(err) = state.notifier.notify_job_created(job_id, Some(added.as_slice())) {
            warn!(job_id = %job_id, error = %err, "job created notification failed");
        }
    }

    Ok(AccessGrant {
        job_id,
        added_drivers: added,
    })
}

/// Applies a partial update. The window may only move while the job is
/// unassigned, and the state may only advance ACCEPTED -> ONGOING -> COMPLETED;
/// acceptance and rejection go through the assignment engine.
pub async fn update_job(state: &AppState, id: Uuid, patch: JobPatch) -> Result<Job, AppError> {
    let result = update_in_transaction(state, id, patch).await;
    state.metrics.record_transition("update", result.is_ok());
    let (job, state_changed) = result?;

    if state_changed && job.assigned_driver_id.is_some() {
        info!(job_id = %id, state = %job.state, "job state changed");
        if let Err(err) = state.notifier.notify_job_status_changed(id) {
            warn!(job_id = %id, error = %err, "job status notification failed");
        }
    }

    Ok(job)
}

async fn update_in_transaction(
    state: &AppState,
    id: Uuid,
    patch: JobPatch,
) -> Result<(Job, bool), AppError> {
    let _tx = state.begin("update_job").await?;

    let mut job = get_job(state, id)?;
    let previous_state = job.state;

    if patch.touches_window() && job.state != JobState::Pending {
        return Err(AppError::InvalidState(format!(
            "job {id} is {}; its window can only change while PENDING",
            job.state
        )));
    }

    if let Some(next) = patch.state {
        check_manual_transition(id, job.state, next)?;
    }

    if let Some(client_name) = patch.client_name {
        job.client_name = client_name;
    }
    if let Some(nationality) = patch.nationality {
        job.nationality = nationality;
    }
    if let Some(passengers) = patch.number_of_passengers {
        if passengers == 0 {
            return Err(AppError::BadRequest(
                "number_of_passengers must be > 0".to_string(),
            ));
        }
        job.number_of_passengers = passengers;
    }
    if let Some(pickup_location) = patch.pickup_location {
        job.pickup_location = pickup_location;
    }
    if let Some(start_date) = patch.start_date {
        job.start_date = start_date;
    }
    if let Some(end_date) = patch.end_date {
        job.end_date = end_date;
    }
    if let Some(pickup_time) = patch.pickup_time {
        job.pickup_time = pickup_time;
    }
    if let Some(distance) = patch.distance {
        job.distance = distance;
    }
    if let Some(payment_amount) = patch.payment_amount {
        job.payment_amount = payment_amount;
    }
    if let Some(details) = patch.additional_details {
        job.additional_details = Some(details);
    }
    if let Some(next) = patch.state {
        job.state = next;
    }

    validate_descriptive(&job.client_name, &job.pickup_location)?;
    validate_amounts(job.distance, job.payment_amount)?;
    if job.start_date > job.end_date {
        return Err(AppError::InvalidRange(format!(
            "job window starts after it ends ({} > {})",
            job.start_date, job.end_date
        )));
    }

    job.updated_at = Utc::now();
    state.jobs.insert(id, job.clone());
    let state_changed = previous_state != job.state;
    Ok((job, state_changed))
}

/// Deletes a job together with the calendar entries it created.
pub async fn remove_job(state: &AppState, id: Uuid) -> Result<Job, AppError> {
    let _tx = state.begin("remove_job").await?;

    let job = get_job(state, id)?;

    let linked: Vec<Uuid> = state
        .availability
        .iter()
        .filter(|entry| {
            let interval = entry.value();
            interval.job_id == Some(id) && interval.status == AvailabilityStatus::Job
        })
        .map(|entry| *entry.key())
        .collect();
    for interval_id in &linked {
        state.availability.remove(interval_id);
    }
    state.jobs.remove(&id);

    info!(job_id = %id, released_intervals = linked.len(), "job removed");
    Ok(job)
}

fn check_manual_transition(id: Uuid, current: JobState, next: JobState) -> Result<(), AppError> {
    let allowed = current == next
        || matches!(
            (current, next),
            (JobState::Accepted, JobState::Ongoing) | (JobState::Ongoing, JobState::Completed)
        );

    if allowed {
        Ok(())
    } else {
        Err(AppError::InvalidState(format!(
            "job {id} cannot move from {current} to {next} by update"
        )))
    }
}

fn validate_descriptive(client_name: &str, pickup_location: &str) -> Result<(), AppError> {
    if client_name.trim().is_empty() {
        return Err(AppError::BadRequest("client_name cannot be empty".to_string()));
    }
    if pickup_location.trim().is_empty() {
        return Err(AppError::BadRequest(
            "pickup_location cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_amounts(distance: f64, payment_amount: f64) -> Result<(), AppError> {
    if !distance.is_finite() || distance < 0.0 {
        return Err(AppError::BadRequest("distance must be >= 0".to_string()));
    }
    if !payment_amount.is_finite() || payment_amount < 0.0 {
        return Err(AppError::BadRequest(
            "payment_amount must be >= 0".to_string(),
        ));
    }
    Ok(())
}
