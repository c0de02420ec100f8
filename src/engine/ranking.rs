use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::jobs::get_job;
use crate::error::AppError;
use crate::models::availability::AvailabilityStatus;
use crate::models::job::JobState;
use crate::models::ranking::{
    CancellationOutcome, DriverRanking, Feedback, FeedbackOutcome, NormalizationOutcome,
    RankingInputs, RankingView, WorkRateReport, WorkRateUpdate, MAX_WORK_RATE,
};
use crate::state::AppState;

/// Returns the driver's ranking, creating a zeroed one on first use.
pub fn initialize(state: &AppState, driver_id: Uuid) -> DriverRanking {
    let ranking = state
        .rankings
        .entry(driver_id)
        .or_insert_with(|| DriverRanking::zeroed(driver_id))
        .value()
        .clone();
    publish_score(state, &ranking);
    ranking
}

pub fn by_driver(state: &AppState, driver_id: Uuid) -> Result<RankingView, AppError> {
    let ranking = load(state, driver_id)?;
    Ok(view(state, ranking))
}

pub fn all(state: &AppState) -> Vec<RankingView> {
    sorted_rankings(state)
        .into_iter()
        .map(|ranking| view(state, ranking))
        .collect()
}

pub fn top_drivers(state: &AppState, limit: usize) -> Vec<RankingView> {
    sorted_rankings(state)
        .into_iter()
        .take(limit)
        .map(|ranking| view(state, ranking))
        .collect()
}

/// Rescoring from the stored rates.
pub async fn recompute(state: &AppState, driver_id: Uuid) -> Result<RankingView, AppError> {
    let _tx = state.begin_ranking("recompute").await?;

    let mut ranking = load(state, driver_id)?;
    ranking.average_rate = state.scorer.score(ranking.inputs()).await;
    let ranking = store(state, ranking);

    debug!(driver_id = %driver_id, average_rate = ranking.average_rate, "ranking recomputed");
    Ok(view(state, ranking))
}

/// One discrete work-day credit. Saturates at [`MAX_WORK_RATE`].
pub async fn credit_work(state: &AppState, driver_id: Uuid) -> Result<RankingView, AppError> {
    let _tx = state.begin_ranking("credit_work").await?;

    let mut ranking = load(state, driver_id)?;
    ranking.work_rate = ranking.work_rate.saturating_add(1).min(MAX_WORK_RATE);
    let ranking = store(state, ranking);

    Ok(view(state, ranking))
}

pub async fn credit_feedback(
    state: &AppState,
    driver_id: Uuid,
    feedback: Feedback,
) -> Result<RankingView, AppError> {
    let (_, updated) = apply_feedback(state, driver_id, feedback).await?;
    Ok(view(state, updated))
}

/// Feedback from a client on a finished job, credited to its driver.
pub async fn submit_job_feedback(
    state: &AppState,
    job_id: Uuid,
    feedback: Feedback,
) -> Result<FeedbackOutcome, AppError> {
    let job = get_job(state, job_id)?;

    if job.state != JobState::Completed {
        return Err(AppError::InvalidState(format!(
            "job {job_id} is {}; feedback is only accepted for COMPLETED jobs",
            job.state
        )));
    }
    let driver_id = job.assigned_driver_id.ok_or_else(|| {
        AppError::InvalidOperation(format!("job {job_id} has no assigned driver"))
    })?;

    let (previous, updated) = apply_feedback(state, driver_id, feedback).await?;

    info!(job_id = %job_id, driver_id = %driver_id, feedback = feedback.delta(), "job feedback recorded");
    Ok(FeedbackOutcome {
        job_id,
        driver_id,
        driver_name: state.driver_name(driver_id),
        previous_feedback_rate: previous.feedback_rate,
        new_feedback_rate: updated.feedback_rate,
        previous_average_rate: previous.average_rate,
        new_average_rate: updated.average_rate,
    })
}

pub async fn credit_cancellation(
    state: &AppState,
    driver_id: Uuid,
) -> Result<CancellationOutcome, AppError> {
    let _tx = state.begin_ranking("credit_cancellation").await?;

    let previous = load(state, driver_id)?;
    let mut ranking = previous.clone();
    ranking.cancellation_rate = ranking.cancellation_rate.saturating_add(1);
    ranking.average_rate = state.scorer.score(ranking.inputs()).await;
    let ranking = store(state, ranking);

    info!(
        driver_id = %driver_id,
        cancellation_rate = ranking.cancellation_rate,
        average_rate = ranking.average_rate,
        "cancellation recorded"
    );
    Ok(CancellationOutcome {
        driver_id,
        previous_cancellation_rate: previous.cancellation_rate,
        new_cancellation_rate: ranking.cancellation_rate,
        previous_average_rate: previous.average_rate,
        new_average_rate: ranking.average_rate,
    })
}

/// Rebuilds work rates from job calendar entries starting in the trailing
/// window. Unlike [`credit_work`] this overwrites the stored work rate, and it
/// creates rankings for drivers with job history but no record.
pub async fn process_work_rates(
    state: &AppState,
    now: DateTime<Utc>,
) -> Result<WorkRateReport, AppError> {
    let period_start = now - Duration::days(state.work_rate_window_days);

    let mut work: BTreeMap<Uuid, (i64, usize)> = BTreeMap::new();
    let mut total_intervals = 0;
    for entry in state.availability.iter() {
        let interval = entry.value();
        if interval.status != AvailabilityStatus::Job || interval.start_date < period_start {
            continue;
        }
        let days = (interval.end_date.date_naive() - interval.start_date.date_naive()).num_days() + 1;
        let tally = work.entry(interval.driver_id).or_insert((0, 0));
        tally.0 += days.max(0);
        tally.1 += 1;
        total_intervals += 1;
    }

    let _tx = state.begin_ranking("process_work_rates").await?;

    let mut driver_updates = Vec::with_capacity(work.len());
    for (driver_id, (work_days, jobs_processed)) in work {
        let work_rate = work_days.clamp(0, MAX_WORK_RATE as i64) as u32;
        let existing = state.rankings.get(&driver_id).map(|entry| entry.value().clone());
        let is_new = existing.is_none();

        let mut ranking = existing.unwrap_or_else(|| DriverRanking::zeroed(driver_id));
        let previous_average_rate = (!is_new).then_some(ranking.average_rate);
        ranking.work_rate = work_rate;
        ranking.average_rate = state.scorer.score(ranking.inputs()).await;
        let ranking = store(state, ranking);

        driver_updates.push(WorkRateUpdate {
            driver_id,
            driver_name: state.driver_name(driver_id),
            work_days,
            updated_work_rate: ranking.work_rate,
            previous_average_rate,
            new_average_rate: ranking.average_rate,
            jobs_processed,
            is_new,
        });
    }

    info!(
        drivers = driver_updates.len(),
        intervals = total_intervals,
        "work rates processed"
    );
    Ok(WorkRateReport {
        total_drivers_processed: driver_updates.len(),
        total_intervals_processed: total_intervals,
        period_start,
        period_end: now,
        driver_updates,
    })
}

/// Rescoring of the whole pool in one batch. Scores are written back only
/// once the full batch is in, matched to drivers by position.
pub async fn normalize_all(state: &AppState) -> Result<NormalizationOutcome, AppError> {
    let _tx = state.begin_ranking("normalize_all").await?;

    let pool = sorted_rankings(state);
    let total_drivers = pool.len();
    if total_drivers < 2 {
        return Ok(NormalizationOutcome {
            message: "Not enough drivers for normalization".to_string(),
            total_drivers,
            applied: false,
        });
    }

    let inputs: Vec<RankingInputs> = pool.iter().map(DriverRanking::inputs).collect();
    let scores = state.scorer.score_batch(inputs).await;
    if scores.len() != total_drivers {
        return Err(AppError::Internal(format!(
            "normalization returned {} scores for {total_drivers} drivers",
            scores.len()
        )));
    }

    for (mut ranking, score) in pool.into_iter().zip(scores) {
        ranking.average_rate = score;
        store(state, ranking);
    }

    info!(total_drivers, "rankings normalized");
    Ok(NormalizationOutcome {
        message: "Normalization completed successfully".to_string(),
        total_drivers,
        applied: true,
    })
}

async fn apply_feedback(
    state: &AppState,
    driver_id: Uuid,
    feedback: Feedback,
) -> Result<(DriverRanking, DriverRanking), AppError> {
    let _tx = state.begin_ranking("credit_feedback").await?;

    let previous = load(state, driver_id)?;
    let mut ranking = previous.clone();
    ranking.feedback_rate = ranking.feedback_rate.saturating_add(feedback.delta());
    ranking.average_rate = state.scorer.score(ranking.inputs()).await;
    let ranking = store(state, ranking);

    Ok((previous, ranking))
}

fn load(state: &AppState, driver_id: Uuid) -> Result<DriverRanking, AppError> {
    state
        .rankings
        .get(&driver_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("ranking not found for driver {driver_id}")))
}

fn store(state: &AppState, mut ranking: DriverRanking) -> DriverRanking {
    ranking.updated_at = Utc::now();
    state.rankings.insert(ranking.driver_id, ranking.clone());
    publish_score(state, &ranking);
    ranking
}

fn publish_score(state: &AppState, ranking: &DriverRanking) {
    state
        .metrics
        .driver_score
        .with_label_values(&[&ranking.driver_id.to_string()])
        .set(ranking.average_rate);
}

fn view(state: &AppState, ranking: DriverRanking) -> RankingView {
    let driver = state
        .drivers
        .get(&ranking.driver_id)
        .map(|driver| driver.summary());
    RankingView { ranking, driver }
}

fn sorted_rankings(state: &AppState) -> Vec<DriverRanking> {
    let mut rankings: Vec<DriverRanking> = state
        .rankings
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    rankings.sort_by(|a, b| {
        b.average_rate
            .total_cmp(&a.average_rate)
            .then_with(|| a.driver_id.cmp(&b.driver_id))
    });
    rankings
}
