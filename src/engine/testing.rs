//! Fixtures shared by the engine unit tests.

use chrono::{DateTime, TimeZone, Utc};
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::engine::notifications::{JobNotifier, NotifyError};
use crate::engine::scoring::{ScoringError, ScoringStrategy};
use crate::models::driver::{NewDriver, Vehicle};
use crate::models::job::{NewJob, PostType};
use crate::models::ranking::RankingInputs;

pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, d, 0, 0, 0).unwrap()
}

pub fn sample_driver(first_name: &str) -> NewDriver {
    NewDriver {
        first_name: first_name.to_string(),
        last_name: "Perera".to_string(),
        email: format!("{}@drivemate.test", first_name.to_lowercase()),
        contact_number: format!("+94-{}", Uuid::new_v4().simple()),
        vehicle: Vehicle {
            vehicle_type: "Van".to_string(),
            capacity: 8,
            license: "WP-KA-1234".to_string(),
        },
    }
}

pub fn sample_job(post_type: PostType, start: DateTime<Utc>, end: DateTime<Utc>) -> NewJob {
    NewJob {
        client_name: "Maria Jensen".to_string(),
        nationality: "Danish".to_string(),
        number_of_passengers: 3,
        pickup_location: "Bandaranaike International Airport".to_string(),
        start_date: start,
        end_date: end,
        pickup_time: start,
        distance: 120.5,
        payment_amount: 95.0,
        additional_details: None,
        post_type,
    }
}

pub struct FailingNotifier;

impl JobNotifier for FailingNotifier {
    fn notify_job_created(&self, _job_id: Uuid, _driver_ids: Option<&[Uuid]>) -> Result<(), NotifyError> {
        Err(NotifyError::Rejected("push gateway down".to_string()))
    }

    fn notify_job_accepted(&self, _job_id: Uuid, _driver_id: Uuid) -> Result<(), NotifyError> {
        Err(NotifyError::Rejected("push gateway down".to_string()))
    }

    fn notify_job_status_changed(&self, _job_id: Uuid) -> Result<(), NotifyError> {
        Err(NotifyError::Rejected("push gateway down".to_string()))
    }

    fn notify_job_cancelled(
        &self,
        _job_id: Uuid,
        _driver_id: Uuid,
        _reason: Option<&str>,
    ) -> Result<(), NotifyError> {
        Err(NotifyError::Rejected("push gateway down".to_string()))
    }
}

/// Primary scorer that is always down.
pub struct UnavailableScorer;

impl ScoringStrategy for UnavailableScorer {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn score(&self, _input: RankingInputs) -> BoxFuture<'_, Result<f64, ScoringError>> {
        Box::pin(async { Err(ScoringError::Unavailable("scorer offline".to_string())) })
    }

    fn score_batch(
        &self,
        _inputs: Vec<RankingInputs>,
    ) -> BoxFuture<'_, Result<Vec<f64>, ScoringError>> {
        Box::pin(async { Err(ScoringError::Unavailable("scorer offline".to_string())) })
    }
}
