use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::identity::AuthenticatedDriver;
use crate::engine::assignment::{accept_job, reject_job};
use crate::engine::jobs::{self, AccessGrant};
use crate::error::AppError;
use crate::models::job::{Job, JobPatch, NewJob};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/available", get(list_available))
        .route("/jobs/mine", get(list_mine))
        .route(
            "/jobs/:id",
            get(get_job).patch(update_job).delete(remove_job),
        )
        .route("/jobs/:id/accept", post(accept))
        .route("/jobs/:id/reject", post(reject))
        .route("/jobs/:id/private-access", post(grant_access))
}

#[derive(Serialize)]
pub struct JobTransitionResponse {
    pub message: String,
    pub job: Job,
}

#[derive(Deserialize)]
pub struct RejectJobRequest {
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

#[derive(Deserialize)]
pub struct GrantAccessRequest {
    pub driver_ids: Vec<Uuid>,
}

async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewJob>,
) -> Result<Json<Job>, AppError> {
    Ok(Json(jobs::create_job(&state, payload).await?))
}

async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<Job>> {
    Json(jobs::list_jobs(&state))
}

async fn list_available(
    State(state): State<Arc<AppState>>,
    AuthenticatedDriver(driver_id): AuthenticatedDriver,
) -> Json<Vec<Job>> {
    Json(jobs::list_available_for_driver(&state, driver_id))
}

async fn list_mine(
    State(state): State<Arc<AppState>>,
    AuthenticatedDriver(driver_id): AuthenticatedDriver,
) -> Json<Vec<Job>> {
    Json(jobs::list_for_driver(&state, driver_id))
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, AppError> {
    Ok(Json(jobs::get_job(&state, id)?))
}

async fn update_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(patch): Json<JobPatch>,
) -> Result<Json<Job>, AppError> {
    Ok(Json(jobs::update_job(&state, id, patch).await?))
}

async fn remove_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, AppError> {
    Ok(Json(jobs::remove_job(&state, id).await?))
}

async fn accept(
    State(state): State<Arc<AppState>>,
    AuthenticatedDriver(driver_id): AuthenticatedDriver,
    Path(id): Path<Uuid>,
) -> Result<Json<JobTransitionResponse>, AppError> {
    let job = accept_job(&state, id, driver_id).await?;

    Ok(Json(JobTransitionResponse {
        message: "Job accepted successfully".to_string(),
        job,
    }))
}

async fn reject(
    State(state): State<Arc<AppState>>,
    AuthenticatedDriver(driver_id): AuthenticatedDriver,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectJobRequest>,
) -> Result<Json<JobTransitionResponse>, AppError> {
    let job = reject_job(&state, id, driver_id, payload.rejection_reason).await?;

    Ok(Json(JobTransitionResponse {
        message: "Job rejected successfully".to_string(),
        job,
    }))
}

async fn grant_access(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<GrantAccessRequest>,
) -> Result<Json<AccessGrant>, AppError> {
    Ok(Json(
        jobs::grant_private_access(&state, id, payload.driver_ids).await?,
    ))
}
