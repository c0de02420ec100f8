use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tokio::time::timeout;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::notifications::{BroadcastNotifier, JobNotifier};
use crate::engine::scoring::Scorer;
use crate::error::AppError;
use crate::models::availability::AvailabilityInterval;
use crate::models::driver::Driver;
use crate::models::event::JobEvent;
use crate::models::job::Job;
use crate::models::ranking::DriverRanking;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub drivers: DashMap<Uuid, Driver>,
    pub jobs: DashMap<Uuid, Job>,
    pub availability: DashMap<Uuid, AvailabilityInterval>,
    /// Keyed by driver id; a driver owns at most one ranking.
    pub rankings: DashMap<Uuid, DriverRanking>,
    pub job_events_tx: broadcast::Sender<JobEvent>,
    pub notifier: Arc<dyn JobNotifier>,
    pub scorer: Scorer,
    pub metrics: Metrics,
    pub work_rate_window_days: i64,
    transaction_timeout: Duration,
    // Serializes every write to `jobs` and `availability`.
    schedule_lock: Mutex<()>,
    // Serializes read-score-write cycles on `rankings`.
    ranking_lock: Mutex<()>,
}

/// Exclusive access to the schedule (or ranking) tables for one operation.
/// Checks and writes made while it is held are atomic with respect to every
/// other transaction on the same lock.
pub struct Transaction<'a> {
    _guard: MutexGuard<'a, ()>,
    operation: &'static str,
    started: Instant,
    metrics: &'a Metrics,
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.metrics
            .transaction_latency_seconds
            .with_label_values(&[self.operation])
            .observe(self.started.elapsed().as_secs_f64());
    }
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let metrics = Metrics::new();
        let scorer = Scorer::from_config(config, metrics.scoring_fallbacks_total.clone());
        let (job_events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);
        let notifier = Arc::new(BroadcastNotifier::new(job_events_tx.clone()));

        Self {
            drivers: DashMap::new(),
            jobs: DashMap::new(),
            availability: DashMap::new(),
            rankings: DashMap::new(),
            job_events_tx,
            notifier,
            scorer,
            metrics,
            work_rate_window_days: config.work_rate_window_days,
            transaction_timeout: config.transaction_timeout(),
            schedule_lock: Mutex::new(()),
            ranking_lock: Mutex::new(()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn JobNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_scorer(mut self, scorer: Scorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub async fn begin(&self, operation: &'static str) -> Result<Transaction<'_>, AppError> {
        self.acquire(&self.schedule_lock, operation).await
    }

    pub async fn begin_ranking(&self, operation: &'static str) -> Result<Transaction<'_>, AppError> {
        self.acquire(&self.ranking_lock, operation).await
    }

    async fn acquire<'a>(
        &'a self,
        lock: &'a Mutex<()>,
        operation: &'static str,
    ) -> Result<Transaction<'a>, AppError> {
        let guard = timeout(self.transaction_timeout, lock.lock())
            .await
            .map_err(|_| AppError::TransactionTimeout(self.transaction_timeout.as_millis() as u64))?;

        Ok(Transaction {
            _guard: guard,
            operation,
            started: Instant::now(),
            metrics: &self.metrics,
        })
    }

    /// Intervals of one driver, cloned out of the map.
    pub fn intervals_for_driver(&self, driver_id: Uuid) -> Vec<AvailabilityInterval> {
        self.availability
            .iter()
            .filter(|entry| entry.value().driver_id == driver_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn driver_name(&self, driver_id: Uuid) -> Option<String> {
        self.drivers.get(&driver_id).map(|driver| driver.full_name())
    }
}
