use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::identity::AuthenticatedDriver;
use crate::engine::availability::{self, AvailableDriver};
use crate::error::AppError;
use crate::models::availability::{AvailabilityInterval, IntervalPatch};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/availability/busy", post(add_busy))
        .route("/availability/free-drivers", get(free_drivers))
        .route("/availability/driver/:driver_id", get(list_for_driver))
        .route(
            "/availability/:id",
            get(get_interval).patch(update_interval).delete(delete_interval),
        )
}

#[derive(Deserialize)]
pub struct PeriodRequest {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

async fn add_busy(
    State(state): State<Arc<AppState>>,
    AuthenticatedDriver(driver_id): AuthenticatedDriver,
    Json(payload): Json<PeriodRequest>,
) -> Result<Json<AvailabilityInterval>, AppError> {
    let interval =
        availability::add_busy_interval(&state, driver_id, payload.start_date, payload.end_date)
            .await?;
    Ok(Json(interval))
}

async fn free_drivers(
    State(state): State<Arc<AppState>>,
    Query(window): Query<PeriodRequest>,
) -> Result<Json<Vec<AvailableDriver>>, AppError> {
    let drivers =
        availability::find_available_drivers(&state, window.start_date, window.end_date)?;
    Ok(Json(drivers))
}

async fn list_for_driver(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<Uuid>,
) -> Json<Vec<AvailabilityInterval>> {
    Json(availability::list_for_driver(&state, driver_id))
}

async fn get_interval(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AvailabilityInterval>, AppError> {
    Ok(Json(availability::get_interval(&state, id)?))
}

async fn update_interval(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(patch): Json<IntervalPatch>,
) -> Result<Json<AvailabilityInterval>, AppError> {
    Ok(Json(availability::update_interval(&state, id, patch).await?))
}

async fn delete_interval(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AvailabilityInterval>, AppError> {
    Ok(Json(availability::delete_busy_interval(&state, id).await?))
}
