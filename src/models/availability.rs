use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AvailabilityStatus {
    Available,
    Busy,
    Job,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityInterval {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: AvailabilityStatus,
    pub job_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl AvailabilityInterval {
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        overlaps(self.start_date, self.end_date, start, end)
    }
}

/// Closed-interval overlap: `[a_start, a_end]` and `[b_start, b_end]` share at least one instant.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start <= b_end && a_end >= b_start
}

/// Field-by-field calendar edit. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntervalPatch {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: Option<AvailabilityStatus>,
}

impl IntervalPatch {
    pub fn is_empty(&self) -> bool {
        self.start_date.is_none() && self.end_date.is_none() && self.status.is_none()
    }
}
