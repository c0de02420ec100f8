use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::engine::{drivers, jobs};
use crate::error::AppError;
use crate::models::driver::{Driver, DriverPatch, NewDriver};
use crate::models::job::Job;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(register_driver).get(list_drivers))
        .route(
            "/drivers/:id",
            get(get_driver).patch(update_driver).delete(remove_driver),
        )
        .route("/drivers/:id/jobs", get(list_driver_jobs))
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewDriver>,
) -> Result<Json<Driver>, AppError> {
    let driver = drivers::register_driver(&state, payload).await?;
    Ok(Json(driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<drivers::RankedDriver>> {
    Json(drivers::list_drivers(&state))
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    Ok(Json(drivers::get_driver(&state, id)?))
}

async fn update_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(patch): Json<DriverPatch>,
) -> Result<Json<Driver>, AppError> {
    Ok(Json(drivers::update_driver(&state, id, patch).await?))
}

async fn remove_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    Ok(Json(drivers::remove_driver(&state, id).await?))
}

async fn list_driver_jobs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Job>>, AppError> {
    drivers::get_driver(&state, id)?;
    Ok(Json(jobs::list_for_driver(&state, id)))
}
