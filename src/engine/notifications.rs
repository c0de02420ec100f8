use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::models::event::{JobEvent, JobEventKind};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Outbound job notifications. Delivery is fire-and-forget: callers log a
/// failure and carry on.
pub trait JobNotifier: Send + Sync {
    fn notify_job_created(&self, job_id: Uuid, driver_ids: Option<&[Uuid]>) -> Result<(), NotifyError>;

    fn notify_job_accepted(&self, job_id: Uuid, driver_id: Uuid) -> Result<(), NotifyError>;

    fn notify_job_status_changed(&self, job_id: Uuid) -> Result<(), NotifyError>;

    fn notify_job_cancelled(
        &self,
        job_id: Uuid,
        driver_id: Uuid,
        reason: Option<&str>,
    ) -> Result<(), NotifyError>;
}

/// Publishes every notification as a [`JobEvent`] on a broadcast channel.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<JobEvent>,
}

impl BroadcastNotifier {
    pub fn new(tx: broadcast::Sender<JobEvent>) -> Self {
        Self { tx }
    }

    fn publish(&self, event: JobEvent) -> Result<(), NotifyError> {
        // No subscribers is not a failure; the event simply has no audience yet.
        match self.tx.send(event) {
            Ok(receivers) => debug!(receivers, "job event published"),
            Err(err) => debug!(job_id = %err.0.job_id, "job event dropped: no subscribers"),
        }
        Ok(())
    }
}

impl JobNotifier for BroadcastNotifier {
    fn notify_job_created(&self, job_id: Uuid, driver_ids: Option<&[Uuid]>) -> Result<(), NotifyError> {
        let recipients = driver_ids.map(<[Uuid]>::to_vec).unwrap_or_default();
        self.publish(JobEvent::new(JobEventKind::Created, job_id, recipients))
    }

    fn notify_job_accepted(&self, job_id: Uuid, driver_id: Uuid) -> Result<(), NotifyError> {
        self.publish(JobEvent::new(JobEventKind::Accepted, job_id, vec![driver_id]))
    }

    fn notify_job_status_changed(&self, job_id: Uuid) -> Result<(), NotifyError> {
        self.publish(JobEvent::new(JobEventKind::StatusChanged, job_id, Vec::new()))
    }

    fn notify_job_cancelled(
        &self,
        job_id: Uuid,
        driver_id: Uuid,
        reason: Option<&str>,
    ) -> Result<(), NotifyError> {
        self.publish(
            JobEvent::new(JobEventKind::Cancelled, job_id, vec![driver_id])
                .with_reason(reason.map(str::to_string)),
        )
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast;
    use uuid::Uuid;

    use super::{BroadcastNotifier, JobNotifier};
    use crate::models::event::JobEventKind;

    #[test]
    fn publishing_without_subscribers_succeeds() {
        let (tx, _) = broadcast::channel(4);
        let notifier = BroadcastNotifier::new(tx);
        assert!(notifier.notify_job_status_changed(Uuid::new_v4()).is_ok());
    }

    #[tokio::test]
    async fn cancellation_event_carries_reason() {
        let (tx, mut rx) = broadcast::channel(4);
        let notifier = BroadcastNotifier::new(tx);
        let job_id = Uuid::new_v4();
        let driver_id = Uuid::new_v4();

        notifier
            .notify_job_cancelled(job_id, driver_id, Some("vehicle breakdown"))
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, JobEventKind::Cancelled);
        assert_eq!(event.job_id, job_id);
        assert_eq!(event.driver_ids, vec![driver_id]);
        assert_eq!(event.reason.as_deref(), Some("vehicle breakdown"));
    }
}
