use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::availability::{AvailabilityInterval, AvailabilityStatus, IntervalPatch};
use crate::models::driver::Driver;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct AvailableDriver {
    #[serde(flatten)]
    pub driver: Driver,
    pub average_rate: Option<f64>,
}

pub fn list_for_driver(state: &AppState, driver_id: Uuid) -> Vec<AvailabilityInterval> {
    let mut intervals = state.intervals_for_driver(driver_id);
    intervals.sort_by_key(|interval| (interval.start_date, interval.end_date));
    intervals
}

pub fn get_interval(state: &AppState, id: Uuid) -> Result<AvailabilityInterval, AppError> {
    state
        .availability
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("availability record {id} not found")))
}

pub async fn add_busy_interval(
    state: &AppState,
    driver_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<AvailabilityInterval, AppError> {
    if start >= end {
        return Err(AppError::InvalidRange(format!(
            "busy period must start before it ends ({start} >= {end})"
        )));
    }

    let _tx = state.begin("add_busy_interval").await?;

    if !state.drivers.contains_key(&driver_id) {
        return Err(AppError::NotFound(format!("driver {driver_id} not found")));
    }

    if let Some(existing) = first_overlap(state, driver_id, start, end, None) {
        return Err(AppError::Conflict(format!(
            "driver {driver_id} already has a {:?} period from {} to {}",
            existing.status, existing.start_date, existing.end_date
        )));
    }

    let interval = AvailabilityInterval {
        id: Uuid::new_v4(),
        driver_id,
        start_date: start,
        end_date: end,
        status: AvailabilityStatus::Busy,
        job_id: None,
        created_at: Utc::now(),
    };
    state.availability.insert(interval.id, interval.clone());

    info!(driver_id = %driver_id, interval_id = %interval.id, "busy period added");
    Ok(interval)
}

pub async fn delete_busy_interval(
    state: &AppState,
    id: Uuid,
) -> Result<AvailabilityInterval, AppError> {
    let _tx = state.begin("delete_busy_interval").await?;

    let interval = get_interval(state, id)?;
    if interval.status == AvailabilityStatus::Job {
        return Err(AppError::InvalidOperation(format!(
            "availability record {id} belongs to a job; reject the job instead"
        )));
    }

    state.availability.remove(&id);

    info!(driver_id = %interval.driver_id, interval_id = %id, "availability record removed");
    Ok(interval)
}

/// Calendar edit of a non-job interval. The result must still be a valid,
/// non-overlapping range for the driver.
pub async fn update_interval(
    state: &AppState,
    id: Uuid,
    patch: IntervalPatch,
) -> Result<AvailabilityInterval, AppError> {
    let _tx = state.begin("update_interval").await?;

    let mut interval = get_interval(state, id)?;
    if patch.is_empty() {
        return Ok(interval);
    }

    if interval.status == AvailabilityStatus::Job {
        return Err(AppError::InvalidOperation(format!(
            "availability record {id} belongs to a job and cannot be edited"
        )));
    }
    if patch.status == Some(AvailabilityStatus::Job) {
        return Err(AppError::InvalidOperation(
            "job periods are created only by accepting a job".to_string(),
        ));
    }

    let start = patch.start_date.unwrap_or(interval.start_date);
    let end = patch.end_date.unwrap_or(interval.end_date);
    if start >= end {
        return Err(AppError::InvalidRange(format!(
            "period must start before it ends ({start} >= {end})"
        )));
    }

    if let Some(existing) = first_overlap(state, interval.driver_id, start, end, Some(id)) {
        return Err(AppError::Conflict(format!(
            "period overlaps availability record {} ({} to {})",
            existing.id, existing.start_date, existing.end_date
        )));
    }

    interval.start_date = start;
    interval.end_date = end;
    if let Some(status) = patch.status {
        interval.status = status;
    }
    state.availability.insert(id, interval.clone());

    debug!(interval_id = %id, "availability record updated");
    Ok(interval)
}

/// Drivers with nothing on their calendar in `[start, end]`, best ranked
/// first. Drivers without a ranking count as zero.
pub fn find_available_drivers(
    state: &AppState,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<AvailableDriver>, AppError> {
    if start > end {
        return Err(AppError::InvalidRange(format!(
            "search window starts after it ends ({start} > {end})"
        )));
    }

    let mut candidates: Vec<AvailableDriver> = state
        .drivers
        .iter()
        .filter(|entry| first_overlap(state, *entry.key(), start, end, None).is_none())
        .map(|entry| AvailableDriver {
            driver: entry.value().clone(),
            average_rate: state
                .rankings
                .get(entry.key())
                .map(|ranking| ranking.average_rate),
        })
        .collect();

    candidates.sort_by(|a, b| {
        let score_a = a.average_rate.unwrap_or(0.0);
        let score_b = b.average_rate.unwrap_or(0.0);
        score_b
            .total_cmp(&score_a)
            .then_with(|| a.driver.created_at.cmp(&b.driver.created_at))
    });

    Ok(candidates)
}

/// First interval of `driver_id` overlapping `[start, end]`, ignoring `skip`.
pub(crate) fn first_overlap(
    state: &AppState,
    driver_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    skip: Option<Uuid>,
) -> Option<AvailabilityInterval> {
    state
        .availability
        .iter()
        .find(|entry| {
            let interval = entry.value();
            interval.driver_id == driver_id
                && Some(interval.id) != skip
                && interval.overlaps(start, end)
        })
        .map(|entry| entry.value().clone())
}
