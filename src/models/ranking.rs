use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::DriverSummary;

/// Days in the longest month; work rate saturates here.
pub const MAX_WORK_RATE: u32 = 31;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverRanking {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub work_rate: u32,
    pub feedback_rate: i64,
    pub cancellation_rate: u64,
    pub average_rate: f64,
    pub updated_at: DateTime<Utc>,
}

impl DriverRanking {
    pub fn zeroed(driver_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            driver_id,
            work_rate: 0,
            feedback_rate: 0,
            cancellation_rate: 0,
            average_rate: 0.0,
            updated_at: Utc::now(),
        }
    }

    pub fn inputs(&self) -> RankingInputs {
        RankingInputs {
            work_rate: self.work_rate as f64,
            feedback_rate: self.feedback_rate as f64,
            cancellation_rate: self.cancellation_rate as f64,
            average_rate: self.average_rate,
        }
    }
}

/// Wire shape understood by every scoring strategy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RankingInputs {
    pub work_rate: f64,
    pub feedback_rate: f64,
    pub cancellation_rate: f64,
    pub average_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankingView {
    #[serde(flatten)]
    pub ranking: DriverRanking,
    pub driver: Option<DriverSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Feedback {
    Positive,
    Negative,
}

impl Feedback {
    pub fn delta(self) -> i64 {
        match self {
            Feedback::Positive => 1,
            Feedback::Negative => -1,
        }
    }
}

impl TryFrom<i8> for Feedback {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Feedback::Positive),
            -1 => Ok(Feedback::Negative),
            other => Err(format!("feedback value must be 1 or -1, got {other}")),
        }
    }
}

impl From<Feedback> for i8 {
    fn from(value: Feedback) -> Self {
        match value {
            Feedback::Positive => 1,
            Feedback::Negative => -1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackOutcome {
    pub job_id: Uuid,
    pub driver_id: Uuid,
    pub driver_name: Option<String>,
    pub previous_feedback_rate: i64,
    pub new_feedback_rate: i64,
    pub previous_average_rate: f64,
    pub new_average_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub driver_id: Uuid,
    pub previous_cancellation_rate: u64,
    pub new_cancellation_rate: u64,
    pub previous_average_rate: f64,
    pub new_average_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkRateUpdate {
    pub driver_id: Uuid,
    pub driver_name: Option<String>,
    pub work_days: i64,
    pub updated_work_rate: u32,
    pub previous_average_rate: Option<f64>,
    pub new_average_rate: f64,
    pub jobs_processed: usize,
    pub is_new: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkRateReport {
    pub total_drivers_processed: usize,
    pub total_intervals_processed: usize,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub driver_updates: Vec<WorkRateUpdate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NormalizationOutcome {
    pub message: String,
    pub total_drivers: usize,
    pub applied: bool,
}
