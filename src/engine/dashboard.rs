use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;

use crate::error::AppError;
use crate::models::job::{JobState, PostType};
use crate::state::AppState;

pub const DEFAULT_HISTORY_MONTHS: u32 = 6;
const MAX_HISTORY_MONTHS: u32 = 60;

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_drivers: usize,
    pub jobs_posted_this_month: usize,
    pub pending_jobs: usize,
    pub public_jobs: usize,
    pub private_jobs: usize,
    pub monthly_revenue: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyStats {
    /// `"Mar 2024"`
    pub month: String,
    pub new_drivers: usize,
    pub jobs_posted: usize,
    pub revenue: f64,
}

/// Percentage change of the latest month against the one before. Zero when
/// the earlier month is empty.
#[derive(Debug, Clone, Serialize)]
pub struct MonthlyChanges {
    pub drivers_change: f64,
    pub jobs_change: f64,
    pub revenue_change: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyReport {
    /// Oldest month first.
    pub historical_data: Vec<MonthlyStats>,
    pub changes: MonthlyChanges,
}

/// Headline counters for the admin dashboard, as of `now`.
pub fn stats(state: &AppState, now: DateTime<Utc>) -> Result<DashboardStats, AppError> {
    let (month_start, next_month_start) = month_bounds(now, 0)?;

    let mut stats = DashboardStats {
        total_drivers: state.drivers.len(),
        jobs_posted_this_month: 0,
        pending_jobs: 0,
        public_jobs: 0,
        private_jobs: 0,
        monthly_revenue: 0.0,
    };

    for entry in state.jobs.iter() {
        let job = entry.value();
        if job.state == JobState::Pending {
            stats.pending_jobs += 1;
        }
        match job.visibility.post_type() {
            PostType::Public => stats.public_jobs += 1,
            PostType::Private => stats.private_jobs += 1,
        }
        if job.created_at >= month_start && job.created_at < next_month_start {
            stats.jobs_posted_this_month += 1;
            stats.monthly_revenue += job.payment_amount;
        }
    }

    Ok(stats)
}

/// Per-month registrations, postings and revenue for the `months` calendar
/// months ending with the one containing `now`.
pub fn monthly_stats(
    state: &AppState,
    now: DateTime<Utc>,
    months: u32,
) -> Result<MonthlyReport, AppError> {
    if months == 0 || months > MAX_HISTORY_MONTHS {
        return Err(AppError::BadRequest(format!(
            "months must be between 1 and {MAX_HISTORY_MONTHS}"
        )));
    }

    let mut historical_data = Vec::with_capacity(months as usize);
    for back in (0..months).rev() {
        let (start, end) = month_bounds(now, back)?;
        let within = |at: DateTime<Utc>| at >= start && at < end;

        let new_drivers = state
            .drivers
            .iter()
            .filter(|entry| within(entry.value().created_at))
            .count();

        let (jobs_posted, revenue) = state
            .jobs
            .iter()
            .filter(|entry| within(entry.value().created_at))
            .fold((0, 0.0), |(count, total), entry| {
                (count + 1, total + entry.value().payment_amount)
            });

        historical_data.push(MonthlyStats {
            month: start.format("%b %Y").to_string(),
            new_drivers,
            jobs_posted,
            revenue,
        });
    }

    let changes = match historical_data.as_slice() {
        [.., previous, latest] => MonthlyChanges {
            drivers_change: percent_change(latest.new_drivers as f64, previous.new_drivers as f64),
            jobs_change: percent_change(latest.jobs_posted as f64, previous.jobs_posted as f64),
            revenue_change: percent_change(latest.revenue, previous.revenue),
        },
        _ => MonthlyChanges {
            drivers_change: 0.0,
            jobs_change: 0.0,
            revenue_change: 0.0,
        },
    };

    Ok(MonthlyReport {
        historical_data,
        changes,
    })
}

fn percent_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        0.0
    } else {
        (current - previous) / previous * 100.0
    }
}

/// `[start, end)` of the calendar month `back` months before the one
/// containing `now`.
fn month_bounds(now: DateTime<Utc>, back: u32) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    let index = now.year() * 12 + now.month0() as i32 - back as i32;
    Ok((month_start(index)?, month_start(index + 1)?))
}

fn month_start(index: i32) -> Result<DateTime<Utc>, AppError> {
    let year = index.div_euclid(12);
    let month = index.rem_euclid(12) as u32 + 1;
    let date = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| AppError::Internal(format!("month {year}-{month} out of range")))?;
    Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::config::Config;
    use crate::engine::drivers::register_driver;
    use crate::engine::jobs::create_job;
    use crate::engine::testing::{day, sample_driver, sample_job};

    fn at(year: i32, month: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, d, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn headline_counts_cover_current_month_only() {
        let state = AppState::new(&Config::default());
        register_driver(&state, sample_driver("Dasun")).await.unwrap();
        register_driver(&state, sample_driver("Sahan")).await.unwrap();

        let this_month = create_job(&state, sample_job(PostType::Public, day(1), day(2)))
            .await
            .unwrap();
        let last_month = create_job(&state, sample_job(PostType::Private, day(3), day(4)))
            .await
            .unwrap();
        state.jobs.get_mut(&this_month.id).unwrap().created_at = at(2024, 3, 10);
        state.jobs.get_mut(&last_month.id).unwrap().created_at = at(2024, 2, 28);

        let stats = stats(&state, at(2024, 3, 15)).unwrap();

        assert_eq!(stats.total_drivers, 2);
        assert_eq!(stats.jobs_posted_this_month, 1);
        assert_eq!(stats.pending_jobs, 2);
        assert_eq!(stats.public_jobs, 1);
        assert_eq!(stats.private_jobs, 1);
        assert_eq!(stats.monthly_revenue, this_month.payment_amount);
    }

    #[tokio::test]
    async fn monthly_history_is_oldest_first_with_changes() {
        let state = AppState::new(&Config::default());
        let driver = register_driver(&state, sample_driver("Chathura")).await.unwrap();
        state.drivers.get_mut(&driver.id).unwrap().created_at = at(2024, 2, 5);

        for created in [at(2024, 2, 1), at(2024, 3, 1), at(2024, 3, 31)] {
            let job = create_job(&state, sample_job(PostType::Public, day(1), day(2)))
                .await
                .unwrap();
            state.jobs.get_mut(&job.id).unwrap().created_at = created;
        }

        let report = monthly_stats(&state, at(2024, 3, 31), 3).unwrap();
        let months: Vec<&str> = report
            .historical_data
            .iter()
            .map(|stats| stats.month.as_str())
            .collect();

        assert_eq!(months, vec!["Jan 2024", "Feb 2024", "Mar 2024"]);
        assert_eq!(report.historical_data[1].new_drivers, 1);
        assert_eq!(report.historical_data[1].jobs_posted, 1);
        assert_eq!(report.historical_data[2].jobs_posted, 2);
        assert_eq!(report.changes.jobs_change, 100.0);
        assert_eq!(report.changes.drivers_change, -100.0);
    }

    #[tokio::test]
    async fn history_crosses_year_boundary() {
        let state = AppState::new(&Config::default());
        let report = monthly_stats(&state, at(2024, 1, 10), 2).unwrap();

        assert_eq!(report.historical_data[0].month, "Dec 2023");
        assert_eq!(report.changes.revenue_change, 0.0);
    }

    #[test]
    fn zero_months_is_rejected() {
        let state = AppState::new(&Config::default());
        assert!(matches!(
            monthly_stats(&state, at(2024, 1, 10), 0),
            Err(AppError::BadRequest(_))
        ));
    }
}
