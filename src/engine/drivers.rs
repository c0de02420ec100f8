use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::ranking;
use crate::error::AppError;
use crate::models::driver::{Driver, DriverPatch, NewDriver, Vehicle};
use crate::models::job::JobVisibility;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct RankedDriver {
    #[serde(flatten)]
    pub driver: Driver,
    pub average_rate: Option<f64>,
}

pub async fn register_driver(state: &AppState, profile: NewDriver) -> Result<Driver, AppError> {
    validate_profile(
        &profile.first_name,
        &profile.last_name,
        &profile.email,
        &profile.contact_number,
        &profile.vehicle,
    )?;

    let _tx = state.begin("register_driver").await?;

    ensure_contact_unused(state, &profile.contact_number, None)?;

    let now = Utc::now();
    let driver = Driver {
        id: Uuid::new_v4(),
        first_name: profile.first_name,
        last_name: profile.last_name,
        email: profile.email,
        contact_number: profile.contact_number,
        vehicle: profile.vehicle,
        created_at: now,
        updated_at: now,
    };
    state.drivers.insert(driver.id, driver.clone());

    ranking::initialize(state, driver.id);

    info!(driver_id = %driver.id, "driver registered");
    Ok(driver)
}

pub fn get_driver(state: &AppState, id: Uuid) -> Result<Driver, AppError> {
    state
        .drivers
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))
}

pub fn list_drivers(state: &AppState) -> Vec<RankedDriver> {
    let mut drivers: Vec<RankedDriver> = state
        .drivers
        .iter()
        .map(|entry| RankedDriver {
            driver: entry.value().clone(),
            average_rate: state
                .rankings
                .get(entry.key())
                .map(|ranking| ranking.average_rate),
        })
        .collect();

    drivers.sort_by(|a, b| {
        b.average_rate
            .unwrap_or(0.0)
            .total_cmp(&a.average_rate.unwrap_or(0.0))
            .then_with(|| a.driver.created_at.cmp(&b.driver.created_at))
    });
    drivers
}

pub async fn update_driver(
    state: &AppState,
    id: Uuid,
    patch: DriverPatch,
) -> Result<Driver, AppError> {
    let _tx = state.begin("update_driver").await?;

    let mut driver = get_driver(state, id)?;

    if let Some(first_name) = patch.first_name {
        driver.first_name = first_name;
    }
    if let Some(last_name) = patch.last_name {
        driver.last_name = last_name;
    }
    if let Some(email) = patch.email {
        driver.email = email;
    }
    if let Some(contact_number) = patch.contact_number {
        driver.contact_number = contact_number;
    }
    if let Some(vehicle) = patch.vehicle {
        driver.vehicle = vehicle;
    }

    validate_profile(
        &driver.first_name,
        &driver.last_name,
        &driver.email,
        &driver.contact_number,
        &driver.vehicle,
    )?;
    ensure_contact_unused(state, &driver.contact_number, Some(id))?;

    driver.updated_at = Utc::now();
    state.drivers.insert(id, driver.clone());

    info!(driver_id = %id, "driver profile updated");
    Ok(driver)
}

/// Deletes a driver that no job or calendar entry refers to, together with
/// the driver's ranking and private-job grants.
pub async fn remove_driver(state: &AppState, id: Uuid) -> Result<Driver, AppError> {
    let _tx = state.begin("remove_driver").await?;

    let driver = get_driver(state, id)?;

    let assigned_jobs = state
        .jobs
        .iter()
        .filter(|entry| entry.value().assigned_driver_id == Some(id))
        .count();
    if assigned_jobs > 0 {
        return Err(AppError::Conflict(format!(
            "driver {id} is assigned to {assigned_jobs} job(s)"
        )));
    }
    if !state.intervals_for_driver(id).is_empty() {
        return Err(AppError::Conflict(format!(
            "driver {id} still has calendar entries"
        )));
    }

    for mut entry in state.jobs.iter_mut() {
        if let JobVisibility::Private { authorized_drivers } = &mut entry.value_mut().visibility {
            authorized_drivers.remove(&id);
        }
    }
    state.rankings.remove(&id);
    state.drivers.remove(&id);
    let _ = state.metrics.driver_score.remove_label_values(&[&id.to_string()]);

    info!(driver_id = %id, "driver removed");
    Ok(driver)
}

fn validate_profile(
    first_name: &str,
    last_name: &str,
    email: &str,
    contact_number: &str,
    vehicle: &Vehicle,
) -> Result<(), AppError> {
    for (field, value) in [
        ("first_name", first_name),
        ("last_name", last_name),
        ("contact_number", contact_number),
        ("vehicle.license", vehicle.license.as_str()),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::BadRequest(format!("{field} cannot be empty")));
        }
    }
    if !email.contains('@') {
        return Err(AppError::BadRequest("email is not valid".to_string()));
    }
    if vehicle.capacity == 0 {
        return Err(AppError::BadRequest(
            "vehicle capacity must be > 0".to_string(),
        ));
    }
    Ok(())
}

/// Contact numbers identify a driver; `owner` may keep its own.
fn ensure_contact_unused(
    state: &AppState,
    contact_number: &str,
    owner: Option<Uuid>,
) -> Result<(), AppError> {
    let taken = state.drivers.iter().any(|entry| {
        Some(*entry.key()) != owner && entry.value().contact_number == contact_number
    });
    if taken {
        return Err(AppError::Conflict(format!(
            "contact number {contact_number} is already registered"
        )));
    }
    Ok(())
}
