use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;

use crate::engine::dashboard::{self, DashboardStats, MonthlyReport, DEFAULT_HISTORY_MONTHS};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dashboard/stats", get(stats))
        .route("/dashboard/monthly-stats", get(monthly_stats))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub months: Option<u32>,
}

async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<DashboardStats>, AppError> {
    Ok(Json(dashboard::stats(&state, Utc::now())?))
}

async fn monthly_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<MonthlyReport>, AppError> {
    let months = query.months.unwrap_or(DEFAULT_HISTORY_MONTHS);
    Ok(Json(dashboard::monthly_stats(&state, Utc::now(), months)?))
}
