use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::availability::overlaps;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Pending,
    Accepted,
    Ongoing,
    Completed,
}

impl JobState {
    /// States in which a job carries an assigned driver.
    pub fn is_assigned(&self) -> bool {
        matches!(
            self,
            JobState::Accepted | JobState::Ongoing | JobState::Completed
        )
    }

    /// States that hold a driver's time window.
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Accepted | JobState::Ongoing)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "PENDING"),
            JobState::Accepted => write!(f, "ACCEPTED"),
            JobState::Ongoing => write!(f, "ONGOING"),
            JobState::Completed => write!(f, "COMPLETED"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PostType {
    Public,
    Private,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "post_type", rename_all = "UPPERCASE")]
pub enum JobVisibility {
    Public,
    Private { authorized_drivers: BTreeSet<Uuid> },
}

impl JobVisibility {
    pub fn for_post_type(post_type: PostType) -> Self {
        match post_type {
            PostType::Public => JobVisibility::Public,
            PostType::Private => JobVisibility::Private {
                authorized_drivers: BTreeSet::new(),
            },
        }
    }

    pub fn post_type(&self) -> PostType {
        match self {
            JobVisibility::Public => PostType::Public,
            JobVisibility::Private { .. } => PostType::Private,
        }
    }

    pub fn is_open_to(&self, driver_id: &Uuid) -> bool {
        match self {
            JobVisibility::Public => true,
            JobVisibility::Private { authorized_drivers } => authorized_drivers.contains(driver_id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub client_name: String,
    pub nationality: String,
    pub number_of_passengers: u32,
    pub pickup_location: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub pickup_time: DateTime<Utc>,
    pub distance: f64,
    pub payment_amount: f64,
    pub additional_details: Option<String>,
    #[serde(flatten)]
    pub visibility: JobVisibility,
    pub state: JobState,
    pub assigned_driver_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn window_overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        overlaps(self.start_date, self.end_date, start, end)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    pub client_name: String,
    pub nationality: String,
    pub number_of_passengers: u32,
    pub pickup_location: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub pickup_time: DateTime<Utc>,
    pub distance: f64,
    pub payment_amount: f64,
    pub additional_details: Option<String>,
    pub post_type: PostType,
}

/// Partial job update. The assigned driver is not patchable; it only moves
/// through accept/reject.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobPatch {
    pub client_name: Option<String>,
    pub nationality: Option<String>,
    pub number_of_passengers: Option<u32>,
    pub pickup_location: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub pickup_time: Option<DateTime<Utc>>,
    pub distance: Option<f64>,
    pub payment_amount: Option<f64>,
    pub additional_details: Option<String>,
    pub state: Option<JobState>,
}

impl JobPatch {
    pub fn touches_window(&self) -> bool {
        self.start_date.is_some() || self.end_date.is_some()
    }
}
