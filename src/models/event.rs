use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    Created,
    Accepted,
    StatusChanged,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub id: Uuid,
    pub kind: JobEventKind,
    pub job_id: Uuid,
    /// Recipients for `Created` on private jobs, the acting driver otherwise.
    pub driver_ids: Vec<Uuid>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(kind: JobEventKind, job_id: Uuid, driver_ids: Vec<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            job_id,
            driver_ids,
            reason: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }
}
