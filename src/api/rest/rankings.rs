use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::ranking;
use crate::error::AppError;
use crate::models::ranking::{
    Feedback, FeedbackOutcome, NormalizationOutcome, RankingView, WorkRateReport,
};
use crate::state::AppState;

const DEFAULT_TOP_LIMIT: usize = 10;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/driver-ranking", get(list_rankings))
        .route("/driver-ranking/top", get(top_drivers))
        .route("/driver-ranking/process-work-rates", post(process_work_rates))
        .route("/driver-ranking/normalize", post(normalize))
        .route("/driver-ranking/job-feedback", post(job_feedback))
        .route("/driver-ranking/:driver_id", get(get_ranking))
        .route("/driver-ranking/:driver_id/update-ranking", put(recompute))
        .route("/driver-ranking/:driver_id/credit-work", post(credit_work))
        .route("/driver-ranking/:driver_id/feedback", post(credit_feedback))
}

#[derive(Deserialize)]
pub struct TopQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct FeedbackRequest {
    pub feedback_value: Feedback,
}

#[derive(Deserialize)]
pub struct JobFeedbackRequest {
    pub job_id: Uuid,
    pub feedback_value: Feedback,
}

async fn list_rankings(State(state): State<Arc<AppState>>) -> Json<Vec<RankingView>> {
    Json(ranking::all(&state))
}

async fn top_drivers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TopQuery>,
) -> Json<Vec<RankingView>> {
    let limit = query.limit.unwrap_or(DEFAULT_TOP_LIMIT);
    Json(ranking::top_drivers(&state, limit))
}

async fn get_ranking(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<Uuid>,
) -> Result<Json<RankingView>, AppError> {
    Ok(Json(ranking::by_driver(&state, driver_id)?))
}

async fn recompute(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<Uuid>,
) -> Result<Json<RankingView>, AppError> {
    Ok(Json(ranking::recompute(&state, driver_id).await?))
}

async fn credit_work(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<Uuid>,
) -> Result<Json<RankingView>, AppError> {
    Ok(Json(ranking::credit_work(&state, driver_id).await?))
}

async fn credit_feedback(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<Uuid>,
    Json(payload): Json<FeedbackRequest>,
) -> Result<Json<RankingView>, AppError> {
    Ok(Json(
        ranking::credit_feedback(&state, driver_id, payload.feedback_value).await?,
    ))
}

async fn job_feedback(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<JobFeedbackRequest>,
) -> Result<Json<FeedbackOutcome>, AppError> {
    let outcome =
        ranking::submit_job_feedback(&state, payload.job_id, payload.feedback_value).await?;
    Ok(Json(outcome))
}

async fn process_work_rates(
    State(state): State<Arc<AppState>>,
) -> Result<Json<WorkRateReport>, AppError> {
    Ok(Json(ranking::process_work_rates(&state, Utc::now()).await?))
}

async fn normalize(
    State(state): State<Arc<AppState>>,
) -> Result<Json<NormalizationOutcome>, AppError> {
    Ok(Json(ranking::normalize_all(&state).await?))
}
